use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use cqlens::{
    CompactDecoder, DocumentWriter, Field, Kind, Message, RegistryBuilder, SchemaDef,
    SchemaField, SchemaOrigin, Value, WireReader,
};

fn wire_payload(field_count: usize) -> Vec<u8> {
    let mut message = Message::new(0, 0, Kind::Data);
    message.type_name = "Order".into();
    for n in 0..field_count {
        message.push_field(Field::new(format!("field{n}"), Value::Int64(n as i64)));
        message.push_field(Field::new(
            format!("label{n}"),
            Value::Text(format!("value-{n}")),
        ));
    }
    DocumentWriter::encode(&message)
}

fn bench_wire_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire_decode");
    for &fields in &[4_usize, 16, 64] {
        let payload = wire_payload(fields);
        group.bench_with_input(BenchmarkId::from_parameter(fields), &payload, |b, payload| {
            b.iter(|| {
                let message = WireReader::new(black_box(payload), 64)
                    .read_document()
                    .expect("decode");
                black_box(message)
            });
        });
    }
    group.finish();
}

fn bench_compact_decode(c: &mut Criterion) {
    let mut def = SchemaDef::new("Order");
    def.fields.push(SchemaField::new("a", "int32").with_id(1));
    def.fields.push(SchemaField::new("b", "int64").with_id(2));
    def.fields.push(SchemaField::new("s", "string").with_id(3));
    let mut builder = RegistryBuilder::new();
    builder.add(def, SchemaOrigin::Source);
    let registry = builder.freeze().expect("freeze");

    // a = 21, b = -1, s = "EURUSD", stop.
    let payload: Vec<u8> = vec![
        0x15, 42, 0x16, 0x01, 0x18, 6, b'E', b'U', b'R', b'U', b'S', b'D', 0x00,
    ];

    c.bench_function("compact_decode", |b| {
        b.iter(|| {
            let mut decoder = CompactDecoder::new(black_box(&payload), &registry, 64);
            let message = decoder.decode(registry.default_class()).expect("decode");
            black_box(message)
        });
    });
}

criterion_group!(benches, bench_wire_decode, bench_compact_decode);
criterion_main!(benches);
