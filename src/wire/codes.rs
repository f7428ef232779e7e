//! The closed set of wire type codes.
//!
//! One byte of type information precedes every value and field name. Codes
//! outside this table are a decode error, never a silent skip.

pub const PADDING: u8 = 0x00;
pub const NULL: u8 = 0x80;
pub const BYTES_LENGTH32: u8 = 0x81;
pub const NESTED_BLOCK: u8 = 0x82;
pub const I64_ARRAY: u8 = 0x83;
pub const U8_ARRAY: u8 = 0x84;
pub const I8_ARRAY: u8 = 0x85;
pub const SEQUENCE_START: u8 = 0x86;
pub const SEQUENCE_END: u8 = 0x87;
pub const EVENT_OBJECT: u8 = 0x88;
pub const HINT: u8 = 0x89;
pub const DURATION: u8 = 0x8A;
pub const BOOL_FALSE: u8 = 0x8C;
pub const BOOL_TRUE: u8 = 0x8D;
pub const PADDING32: u8 = 0x8E;
pub const PADDING_END: u8 = 0x8F;

pub const FLOAT32: u8 = 0x90;
pub const FLOAT64: u8 = 0x91;
pub const FLOAT_STOP2: u8 = 0x92;
pub const FLOAT_STOP4: u8 = 0x94;
pub const FLOAT_STOP6: u8 = 0x96;
pub const STRING8: u8 = 0x98;
pub const STRING16: u8 = 0x99;
pub const FLOAT_SET_LOW0: u8 = 0x9A;
pub const FLOAT_SET_LOW2: u8 = 0x9C;
pub const FLOAT_SET_LOW4: u8 = 0x9E;

pub const INT8: u8 = 0xA1;
pub const INT16: u8 = 0xA2;
pub const INT32: u8 = 0xA4;
pub const UINT8: u8 = 0xA5;
pub const UINT16: u8 = 0xA6;
pub const UINT32: u8 = 0xA7;
pub const INT64: u8 = 0xA8;
pub const UINT64: u8 = 0xA9;

pub const TIMESTAMP: u8 = 0xB0;
pub const DATE_TIME: u8 = 0xB1;
pub const ZONED_DATE_TIME: u8 = 0xB2;
pub const DATE: u8 = 0xB3;
pub const TIME: u8 = 0xB4;
pub const UUID: u8 = 0xB5;
pub const TYPE_PREFIX: u8 = 0xB6;
pub const FIELD_NAME_ANY: u8 = 0xB7;
pub const STRING_ANY: u8 = 0xB8;
pub const FIELD_NUMBER: u8 = 0xB9;
pub const FIELD_NAME_LITERAL: u8 = 0xBA;
pub const EVENT_NAME: u8 = 0xBB;
pub const FIELD_ANCHOR: u8 = 0xBC;
pub const ANCHOR: u8 = 0xBD;
pub const UPDATE_ALIAS: u8 = 0xBE;
pub const COMMENT: u8 = 0xBF;

/// Compact field names carry their length in the low five bits.
pub const COMPACT_FIELD_NAME_MIN: u8 = 0xC0;
pub const COMPACT_FIELD_NAME_MAX: u8 = 0xDF;
/// Compact strings likewise.
pub const COMPACT_STRING_MIN: u8 = 0xE0;
pub const COMPACT_STRING_MAX: u8 = 0xFF;

#[inline]
pub fn is_compact_field_name(code: u8) -> bool {
    (COMPACT_FIELD_NAME_MIN..=COMPACT_FIELD_NAME_MAX).contains(&code)
}

#[inline]
pub fn compact_field_name_len(code: u8) -> usize {
    (code - COMPACT_FIELD_NAME_MIN) as usize
}

#[inline]
pub fn is_compact_string(code: u8) -> bool {
    code >= COMPACT_STRING_MIN
}

#[inline]
pub fn compact_string_len(code: u8) -> usize {
    (code - COMPACT_STRING_MIN) as usize
}

/// Codes that introduce a field name in a tagged document.
#[inline]
pub fn is_field_name_code(code: u8) -> bool {
    is_compact_field_name(code)
        || matches!(
            code,
            FIELD_NAME_ANY | FIELD_NAME_LITERAL | FIELD_NUMBER | EVENT_NAME | FIELD_ANCHOR | ANCHOR
        )
}

/// Whether the byte is a member of the closed table at all.
pub fn is_known(code: u8) -> bool {
    if code >= COMPACT_FIELD_NAME_MIN {
        return true;
    }
    matches!(
        code,
        PADDING
            | NULL
            | BYTES_LENGTH32
            | NESTED_BLOCK
            | I64_ARRAY
            | U8_ARRAY
            | I8_ARRAY
            | SEQUENCE_START
            | SEQUENCE_END
            | EVENT_OBJECT
            | HINT
            | DURATION
            | BOOL_FALSE
            | BOOL_TRUE
            | PADDING32
            | PADDING_END
            | FLOAT32
            | FLOAT64
            | FLOAT_STOP2
            | FLOAT_STOP4
            | FLOAT_STOP6
            | STRING8
            | STRING16
            | FLOAT_SET_LOW0
            | FLOAT_SET_LOW2
            | FLOAT_SET_LOW4
            | INT8
            | INT16
            | INT32
            | UINT8
            | UINT16
            | UINT32
            | INT64
            | UINT64
            | TIMESTAMP
            | DATE_TIME
            | ZONED_DATE_TIME
            | DATE
            | TIME
            | UUID
            | TYPE_PREFIX
            | FIELD_NAME_ANY
            | STRING_ANY
            | FIELD_NUMBER
            | FIELD_NAME_LITERAL
            | EVENT_NAME
            | FIELD_ANCHOR
            | ANCHOR
            | UPDATE_ALIAS
            | COMMENT
    )
}
