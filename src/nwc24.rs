//! Console friend codes.
//!
//! A friend code is the decimal form of a 53-bit user id that packs the
//! console's area, model, hardware id and a creation counter, plus a
//! 10-bit check value, through a fixed scramble. [`check_user_id`] undoes
//! the scramble and verifies the check value.

/// Largest value a user id can take.
pub const MAX_USER_ID: u64 = (1 << 53) - 1;

const POLYNOMIAL: u64 = 0x635;
const PRE_MASK: u64 = 0xB3B3_B3B3_B3B3;
const POST_MASK: u64 = 0x5E5E_5E5E_5E5E;

const NIBBLES: [u8; 16] = [
    0x4, 0xB, 0x7, 0x9, 0xF, 0x1, 0xD, 0x3, 0xC, 0x2, 0x6, 0xE, 0x8, 0x0, 0xA, 0x5,
];
const NIBBLES_INV: [u8; 16] = [
    0xD, 0x5, 0x9, 0x7, 0x0, 0xF, 0xA, 0x2, 0xC, 0x3, 0xE, 0x1, 0x8, 0x6, 0xB, 0x4,
];
const BYTE_ORDER: [usize; 6] = [1, 5, 0, 4, 2, 3];

/// Remainder of bits 52..0 against the check polynomial; always below 2^10.
fn remainder(mut value: u64) -> u64 {
    for ctr in 0..=42 {
        if (value >> (52 - ctr)) & 1 == 1 {
            value ^= POLYNOMIAL << (42 - ctr);
        }
    }
    value
}

fn byte(value: u64, index: usize) -> u8 {
    (value >> (index * 8)) as u8
}

fn with_byte(value: u64, index: usize, b: u8) -> u64 {
    (value & !(0xFF << (index * 8))) | (u64::from(b) << (index * 8))
}

fn substitute(mut value: u64, table: &[u8; 16]) -> u64 {
    for i in 0..6 {
        let b = byte(value, i);
        let swapped = (table[usize::from(b >> 4)] << 4) | table[usize::from(b & 0xF)];
        value = with_byte(value, i, swapped);
    }
    value
}

/// Build the user id a console would generate.
pub fn make_user_id(area: u8, model: u8, hollywood_id: u32, counter: u8) -> u64 {
    let packed = (u64::from(area & 0x7) << 50)
        | (u64::from(model & 0x7) << 47)
        | (u64::from(hollywood_id) << 15)
        | (u64::from(counter & 0x1F) << 10);

    let mut id = (packed | remainder(packed)) ^ PRE_MASK;
    id = (id >> 10) | ((id & 0x3FF) << 43);
    id = substitute(id, &NIBBLES);

    let unshuffled = id;
    for (i, &to) in BYTE_ORDER.iter().enumerate() {
        id = with_byte(id, to, byte(unshuffled, i));
    }

    id &= MAX_USER_ID;
    id = ((id << 1) | (id >> 52)) & MAX_USER_ID;
    (id ^ POST_MASK) & MAX_USER_ID
}

/// Whether `id` is a well-formed user id.
pub fn check_user_id(id: u64) -> bool {
    if id > MAX_USER_ID {
        return false;
    }

    let mut value = id ^ POST_MASK;
    value = (value >> 1) | ((value & 1) << 52);

    let shuffled = value;
    for (i, &from) in BYTE_ORDER.iter().enumerate() {
        value = with_byte(value, i, byte(shuffled, from));
    }

    value = substitute(value, &NIBBLES_INV);
    value = ((value & ((1 << 43) - 1)) << 10) | (value >> 43);
    remainder(value ^ PRE_MASK) == 0
}
