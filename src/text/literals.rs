use super::{CursorState, ParseState, Recover, TokenKind};
use crate::fatal;
use crate::ir::V128;

/// Bit-level access to an IEEE binary float, for assembling NaNs,
/// infinities and exactly rounded hexadecimal literals.
pub trait FloatBits: Copy {
    const NUM_SIGNIFICAND_BITS: u32;
    const NUM_EXPONENT_BITS: u32;
    const MAX_SIGNIFICAND: u64 = (1 << Self::NUM_SIGNIFICAND_BITS) - 1;
    const MAX_EXPONENT: u64 = (1 << Self::NUM_EXPONENT_BITS) - 1;
    const EXPONENT_BIAS: i64 = (Self::MAX_EXPONENT / 2) as i64;

    fn from_parts(sign: bool, exponent: u64, significand: u64) -> Self;
    /// The host's strict decimal parser.
    fn from_str_strict(text: &str) -> Option<Self>;
    fn is_infinite(self) -> bool;
}

impl FloatBits for f32 {
    const NUM_SIGNIFICAND_BITS: u32 = 23;
    const NUM_EXPONENT_BITS: u32 = 8;

    fn from_parts(sign: bool, exponent: u64, significand: u64) -> f32 {
        f32::from_bits(((sign as u32) << 31) | ((exponent as u32) << 23) | significand as u32)
    }

    fn from_str_strict(text: &str) -> Option<f32> {
        text.parse().ok()
    }

    fn is_infinite(self) -> bool {
        f32::is_infinite(self)
    }
}

impl FloatBits for f64 {
    const NUM_SIGNIFICAND_BITS: u32 = 52;
    const NUM_EXPONENT_BITS: u32 = 11;

    fn from_parts(sign: bool, exponent: u64, significand: u64) -> f64 {
        f64::from_bits(((sign as u64) << 63) | (exponent << 52) | significand)
    }

    fn from_str_strict(text: &str) -> Option<f64> {
        text.parse().ok()
    }

    fn is_infinite(self) -> bool {
        f64::is_infinite(self)
    }
}

// Parses an optional + or - sign, returning true for -.
fn parse_sign(bytes: &[u8], pos: &mut usize) -> bool {
    match bytes.get(*pos) {
        Some(b'-') => {
            *pos += 1;
            true
        }
        Some(b'+') => {
            *pos += 1;
            false
        }
        _ => false,
    }
}

fn hexit(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Parses an unsigned integer from hexits, starting at "0x". Assumes the
/// input was accepted by the lexer as a hexadecimal integer. On overflow,
/// records "integer literal is too large", consumes the remaining hexits
/// and yields `max_value`.
fn parse_hex_unsigned(
    state: &mut ParseState<'_>,
    bytes: &[u8],
    pos: &mut usize,
    max_value: u64,
) -> u64 {
    let first_hexit = *pos;
    debug_assert!(bytes[*pos] == b'0' && matches!(bytes[*pos + 1], b'x' | b'X'));
    *pos += 2;

    let mut result: u64 = 0;
    while let Some(&byte) = bytes.get(*pos) {
        if byte == b'_' {
            *pos += 1;
            continue;
        }
        let Some(digit) = hexit(byte) else { break };
        if result > (max_value - u64::from(digit)) / 16 {
            state.record(first_hexit, "integer literal is too large");
            result = max_value;
            while bytes.get(*pos).copied().and_then(hexit).is_some() {
                *pos += 1;
            }
            break;
        }
        result = result * 16 + u64::from(digit);
        *pos += 1;
    }
    result
}

/// Parses an unsigned integer from decimal digits. Assumes the input was
/// accepted by the lexer as a decimal integer. On overflow, records
/// "<context> is too large", consumes the remaining digits and separators
/// and yields `max_value`.
fn parse_decimal_unsigned(
    state: &mut ParseState<'_>,
    bytes: &[u8],
    pos: &mut usize,
    max_value: u64,
    context: &str,
) -> u64 {
    let first_digit = *pos;
    let mut result: u64 = 0;
    while let Some(&byte) = bytes.get(*pos) {
        if byte == b'_' {
            *pos += 1;
            continue;
        }
        if !byte.is_ascii_digit() {
            break;
        }
        let digit = u64::from(byte - b'0');
        *pos += 1;

        if result > (max_value - digit) / 10 {
            state.record(first_digit, format!("{context} is too large"));
            result = max_value;
            while matches!(bytes.get(*pos), Some(b'0'..=b'9' | b'_')) {
                *pos += 1;
            }
            break;
        }
        result = result * 10 + digit;
    }
    result
}

/// Parses a NaN literal: max exponent, and either the supplied non-zero
/// payload or the top significand bit.
fn parse_nan<F: FloatBits>(state: &mut ParseState<'_>, bytes: &[u8], pos: &mut usize) -> F {
    let first_char = *pos;
    let sign = parse_sign(bytes, pos);

    debug_assert_eq!(&bytes[*pos..*pos + 3], b"nan");
    *pos += 3;

    let significand = if bytes.get(*pos) == Some(&b':') {
        *pos += 1;
        let payload = parse_hex_unsigned(state, bytes, pos, F::MAX_SIGNIFICAND);
        if payload == 0 {
            state.record(first_char, "NaN significand must be non-zero");
            1
        } else {
            payload
        }
    } else {
        // No explicit payload: set the top significand bit.
        1 << (F::NUM_SIGNIFICAND_BITS - 1)
    };

    F::from_parts(sign, F::MAX_EXPONENT, significand)
}

/// Parses an infinity literal: max exponent, zero significand.
fn parse_infinity<F: FloatBits>(bytes: &[u8], mut pos: usize) -> F {
    let sign = parse_sign(bytes, &mut pos);
    F::from_parts(sign, F::MAX_EXPONENT, 0)
}

/// Parses a decimal or hexadecimal float literal. Assumes the input was
/// accepted by the lexer as a numeric literal.
fn parse_float<F: FloatBits>(state: &mut ParseState<'_>, bytes: &[u8], pos: &mut usize) -> F {
    let first_char = *pos;

    // Scan the token's characters, making an underscore-free copy for the
    // strict parser when separators are present.
    let mut no_underscore = String::new();
    let mut has_underscores = false;
    while let Some(&byte) = bytes.get(*pos) {
        let is_numeric_char = byte.is_ascii_hexdigit()
            || matches!(byte, b'x' | b'X' | b'p' | b'P' | b'+' | b'-' | b'.' | b'_');
        if !is_numeric_char {
            break;
        }

        if byte == b'_' && !has_underscores {
            no_underscore =
                String::from_utf8(bytes[first_char..*pos].to_vec()).expect("ascii digits");
            has_underscores = true;
        } else if byte != b'_' && has_underscores {
            no_underscore.push(byte as char);
        }
        *pos += 1;
    }

    let text = if has_underscores {
        no_underscore.as_str()
    } else {
        core::str::from_utf8(&bytes[first_char..*pos]).expect("ascii digits")
    };

    let unsigned = text.trim_start_matches(['+', '-']);
    let result = if unsigned.starts_with("0x") || unsigned.starts_with("0X") {
        parse_hex_float::<F>(text)
    } else {
        match F::from_str_strict(text) {
            Some(value) => value,
            None => fatal!("strict float parser rejected a number accepted by the lexer: {text}"),
        }
    };

    if result.is_infinite() {
        state.record(first_char, "float literal is too large");
    }
    result
}

/// Converts a hexadecimal float literal to the nearest representable
/// value, ties to even. Overflow yields infinity, which the caller
/// reports; underflow yields a subnormal or zero silently.
fn parse_hex_float<F: FloatBits>(text: &str) -> F {
    let bytes = text.as_bytes();
    let mut pos = 0;
    let sign = parse_sign(bytes, &mut pos);
    debug_assert!(bytes[pos] == b'0' && matches!(bytes[pos + 1], b'x' | b'X'));
    pos += 2;

    // Accumulate up to 124 mantissa bits; further digits only adjust the
    // exponent and the sticky bit.
    let mut mantissa: u128 = 0;
    let mut exponent: i64 = 0;
    let mut sticky = false;

    while let Some(digit) = bytes.get(pos).copied().and_then(hexit) {
        if mantissa >> 124 == 0 {
            mantissa = mantissa * 16 + u128::from(digit);
        } else {
            exponent += 4;
            sticky |= digit != 0;
        }
        pos += 1;
    }
    if bytes.get(pos) == Some(&b'.') {
        pos += 1;
        while let Some(digit) = bytes.get(pos).copied().and_then(hexit) {
            if mantissa >> 124 == 0 {
                mantissa = mantissa * 16 + u128::from(digit);
                exponent -= 4;
            } else {
                sticky |= digit != 0;
            }
            pos += 1;
        }
    }
    if matches!(bytes.get(pos), Some(b'p' | b'P')) {
        pos += 1;
        let exp_negative = parse_sign(bytes, &mut pos);
        let mut binary_exp: i64 = 0;
        while let Some(&byte) = bytes.get(pos) {
            if !byte.is_ascii_digit() {
                break;
            }
            binary_exp = (binary_exp * 10 + i64::from(byte - b'0')).min(1 << 32);
            pos += 1;
        }
        exponent += if exp_negative { -binary_exp } else { binary_exp };
    }

    if mantissa == 0 {
        return F::from_parts(sign, 0, 0);
    }

    // value = mantissa * 2^exponent; its most significant bit sits at
    // 2^(msb + exponent).
    let msb = 127 - mantissa.leading_zeros() as i64;
    let biased_exponent = msb + exponent + F::EXPONENT_BIAS;

    // Normal values keep the implicit bit plus the significand; subnormal
    // values lose one kept bit per exponent step below the minimum.
    let keep_bits = if biased_exponent <= 0 {
        i64::from(F::NUM_SIGNIFICAND_BITS) + biased_exponent
    } else {
        i64::from(F::NUM_SIGNIFICAND_BITS) + 1
    };

    let drop_bits = msb + 1 - keep_bits;
    let mut significand = if drop_bits <= 0 {
        (mantissa << -drop_bits) as u64
    } else if drop_bits > 128 {
        0
    } else {
        round_shift_right(mantissa, drop_bits as u32, sticky)
    };

    if biased_exponent <= 0 {
        // Subnormal, unless rounding carried into the minimum normal.
        if significand >> F::NUM_SIGNIFICAND_BITS != 0 {
            return F::from_parts(sign, 1, 0);
        }
        return F::from_parts(sign, 0, significand);
    }

    let mut exponent_field = biased_exponent as u64;
    if significand >> (F::NUM_SIGNIFICAND_BITS + 1) != 0 {
        // Rounding carried past the implicit bit.
        significand >>= 1;
        exponent_field += 1;
    }
    if exponent_field >= F::MAX_EXPONENT {
        return F::from_parts(sign, F::MAX_EXPONENT, 0);
    }
    F::from_parts(sign, exponent_field, significand & F::MAX_SIGNIFICAND)
}

/// Shifts `mantissa` right by `shift`, rounding to nearest with ties to
/// even; `sticky` folds in truncation that already happened.
fn round_shift_right(mantissa: u128, shift: u32, sticky: bool) -> u64 {
    let (result, guard, rest) = if shift == 128 {
        (0u128, mantissa >> 127 != 0, mantissa & (u128::MAX >> 1) != 0)
    } else {
        (
            mantissa >> shift,
            mantissa >> (shift - 1) & 1 != 0,
            mantissa & ((1 << (shift - 1)) - 1) != 0,
        )
    };
    let round_up = guard && (rest || sticky || result & 1 != 0);
    (result + u128::from(round_up)) as u64
}

/// Tries to parse the next token as an integer in
/// `[min_signed, max_unsigned]`, advancing past it on a match. The value
/// is returned in two's complement.
fn try_parse_int(
    cursor: &mut CursorState<'_, '_>,
    min_signed: i64,
    max_unsigned: u64,
) -> Option<u64> {
    let token = cursor.peek()?;
    let bytes = cursor.state.source().as_bytes();
    let mut pos = token.begin;

    let is_negative;
    let magnitude;
    match token.kind {
        TokenKind::DecimalInt => {
            is_negative = parse_sign(bytes, &mut pos);
            let max = if is_negative {
                min_signed.unsigned_abs()
            } else {
                max_unsigned
            };
            magnitude = parse_decimal_unsigned(cursor.state, bytes, &mut pos, max, "int literal");
        }
        TokenKind::HexInt => {
            is_negative = parse_sign(bytes, &mut pos);
            let max = if is_negative {
                min_signed.unsigned_abs()
            } else {
                max_unsigned
            };
            magnitude = parse_hex_unsigned(cursor.state, bytes, &mut pos, max);
        }
        _ => return None,
    }

    if min_signed == 0 && is_negative {
        return None;
    }
    cursor.bump();
    Some(if is_negative {
        magnitude.wrapping_neg()
    } else {
        magnitude
    })
}

pub fn try_parse_u64(cursor: &mut CursorState<'_, '_>) -> Option<u64> {
    try_parse_int(cursor, 0, u64::MAX)
}

pub fn try_parse_uptr(cursor: &mut CursorState<'_, '_>) -> Option<usize> {
    try_parse_int(cursor, 0, usize::MAX as u64).map(|value| value as usize)
}

pub fn parse_u32(cursor: &mut CursorState<'_, '_>) -> Result<u32, Recover> {
    match try_parse_int(cursor, 0, u64::from(u32::MAX)) {
        Some(value) => Ok(value as u32),
        None => {
            cursor.error_at_next_token("expected u32 literal");
            Err(Recover)
        }
    }
}

pub fn parse_i8(cursor: &mut CursorState<'_, '_>) -> Result<i8, Recover> {
    match try_parse_int(cursor, i64::from(i8::MIN), u64::from(u8::MAX)) {
        Some(value) => Ok(value as i8),
        None => {
            cursor.error_at_next_token("expected i8 literal");
            Err(Recover)
        }
    }
}

pub fn parse_i16(cursor: &mut CursorState<'_, '_>) -> Result<i16, Recover> {
    match try_parse_int(cursor, i64::from(i16::MIN), u64::from(u16::MAX)) {
        Some(value) => Ok(value as i16),
        None => {
            cursor.error_at_next_token("expected i16 literal");
            Err(Recover)
        }
    }
}

pub fn parse_i32(cursor: &mut CursorState<'_, '_>) -> Result<i32, Recover> {
    match try_parse_int(cursor, i64::from(i32::MIN), u64::from(u32::MAX)) {
        Some(value) => Ok(value as i32),
        None => {
            cursor.error_at_next_token("expected i32 literal");
            Err(Recover)
        }
    }
}

pub fn parse_i64(cursor: &mut CursorState<'_, '_>) -> Result<i64, Recover> {
    match try_parse_int(cursor, i64::MIN, u64::MAX) {
        Some(value) => Ok(value as i64),
        None => {
            cursor.error_at_next_token("expected i64 literal");
            Err(Recover)
        }
    }
}

/// Tries to parse the next token as a float, advancing past it on a match.
fn try_parse_float<F: FloatBits>(cursor: &mut CursorState<'_, '_>) -> Option<F> {
    let token = cursor.peek()?;
    let bytes = cursor.state.source().as_bytes();
    let mut pos = token.begin;

    let value = match token.kind {
        TokenKind::DecimalInt
        | TokenKind::DecimalFloat
        | TokenKind::HexInt
        | TokenKind::HexFloat => parse_float::<F>(cursor.state, bytes, &mut pos),
        TokenKind::FloatNan => parse_nan::<F>(cursor.state, bytes, &mut pos),
        TokenKind::FloatInf => parse_infinity::<F>(bytes, pos),
        _ => {
            cursor.error_at_next_token("expected float literal");
            return None;
        }
    };
    cursor.bump();
    Some(value)
}

pub fn parse_f32(cursor: &mut CursorState<'_, '_>) -> Result<f32, Recover> {
    try_parse_float(cursor).ok_or(Recover)
}

pub fn parse_f64(cursor: &mut CursorState<'_, '_>) -> Result<f64, Recover> {
    try_parse_float(cursor).ok_or(Recover)
}

/// Parses a lane-type tag followed by that many lane literals.
pub fn parse_v128(cursor: &mut CursorState<'_, '_>) -> Result<V128, Recover> {
    let Some(token) = cursor.peek() else {
        cursor.error_at_next_token("expected v128 literal");
        return Err(Recover);
    };

    let mut result = V128::default();
    match token.kind {
        TokenKind::VecI8x16 => {
            cursor.bump();
            for lane in 0..16 {
                result.set_u8(lane, parse_i8(cursor)? as u8);
            }
        }
        TokenKind::VecI16x8 => {
            cursor.bump();
            for lane in 0..8 {
                result.set_u16(lane, parse_i16(cursor)? as u16);
            }
        }
        TokenKind::VecI32x4 => {
            cursor.bump();
            for lane in 0..4 {
                result.set_u32(lane, parse_i32(cursor)? as u32);
            }
        }
        TokenKind::VecI64x2 => {
            cursor.bump();
            for lane in 0..2 {
                result.set_u64(lane, parse_i64(cursor)? as u64);
            }
        }
        TokenKind::VecF32x4 => {
            cursor.bump();
            for lane in 0..4 {
                result.set_f32(lane, parse_f32(cursor)?);
            }
        }
        TokenKind::VecF64x2 => {
            cursor.bump();
            for lane in 0..2 {
                result.set_f64(lane, parse_f64(cursor)?);
            }
        }
        _ => {
            cursor.error_at_next_token(
                "expected 'i8x16', 'i16x8', 'i32x4', 'i64x2', 'f32x4', or 'f64x2'",
            );
            return Err(Recover);
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::{ParseState, Token};
    use proptest::prelude::*;

    /// A just-enough lexer for tests: whitespace-separated numeric tokens.
    fn lex(source: &str) -> Vec<Token> {
        let bytes = source.as_bytes();
        let mut tokens = Vec::new();
        let mut offset = 0;
        for word in source.split_ascii_whitespace() {
            while bytes[offset].is_ascii_whitespace() {
                offset += 1;
            }
            let unsigned = word.trim_start_matches(['+', '-']);
            let kind = match unsigned {
                "i8x16" => TokenKind::VecI8x16,
                "i16x8" => TokenKind::VecI16x8,
                "i32x4" => TokenKind::VecI32x4,
                "i64x2" => TokenKind::VecI64x2,
                "f32x4" => TokenKind::VecF32x4,
                "f64x2" => TokenKind::VecF64x2,
                "inf" => TokenKind::FloatInf,
                _ if unsigned.starts_with("nan") => TokenKind::FloatNan,
                _ if unsigned.starts_with("0x") || unsigned.starts_with("0X") => {
                    if unsigned.contains(['.', 'p', 'P']) {
                        TokenKind::HexFloat
                    } else {
                        TokenKind::HexInt
                    }
                }
                _ if unsigned.contains(['.', 'e', 'E']) => TokenKind::DecimalFloat,
                _ => TokenKind::DecimalInt,
            };
            tokens.push(Token {
                kind,
                begin: offset,
            });
            offset += word.len();
        }
        tokens
    }

    fn with_cursor<R>(source: &str, f: impl FnOnce(&mut CursorState<'_, '_>) -> R) -> (R, Vec<String>) {
        let mut state = ParseState::new(source);
        let tokens = lex(source);
        let mut cursor = CursorState::new(&mut state, &tokens);
        let result = f(&mut cursor);
        let errors = state
            .into_errors()
            .into_iter()
            .map(|error| error.message)
            .collect();
        (result, errors)
    }

    #[test]
    fn hex_u64_with_separators() {
        let (value, errors) = with_cursor("0x1_0000_0000", |c| try_parse_u64(c));
        assert_eq!(value, Some(0x1_0000_0000));
        assert!(errors.is_empty());
    }

    #[test]
    fn hex_too_large_for_u32_recovers_with_the_bound() {
        let (value, errors) = with_cursor("0x1_0000_0000", |c| parse_u32(c));
        assert_eq!(value, Ok(u32::MAX));
        assert_eq!(errors, ["integer literal is too large"]);
    }

    #[test]
    fn decimal_too_large_names_the_context() {
        let (value, errors) = with_cursor("99999999999999999999999", |c| try_parse_u64(c));
        assert_eq!(value, Some(u64::MAX));
        assert_eq!(errors, ["int literal is too large"]);
    }

    #[test]
    fn negative_unsigned_is_not_a_match() {
        let (value, errors) = with_cursor("-5", |c| parse_u32(c));
        assert_eq!(value, Err(Recover));
        assert_eq!(errors, ["expected u32 literal"]);
    }

    #[test]
    fn signed_ranges_span_both_encodings() {
        assert_eq!(with_cursor("-0x80", |c| parse_i8(c)).0, Ok(-128));
        assert_eq!(with_cursor("255", |c| parse_i8(c)).0, Ok(-1));
        assert_eq!(with_cursor("-2147483648", |c| parse_i32(c)).0, Ok(i32::MIN));
        assert_eq!(
            with_cursor("0xffff_ffff_ffff_ffff", |c| parse_i64(c)).0,
            Ok(-1)
        );
    }

    #[test]
    fn nan_payload_forms() {
        let (value, errors) = with_cursor("nan:0x200000", |c| parse_f32(c));
        assert_eq!(value.unwrap().to_bits(), 0x7fa0_0000);
        assert!(errors.is_empty());

        let (value, errors) = with_cursor("nan:0x0", |c| parse_f32(c));
        assert_eq!(value.unwrap().to_bits(), 0x7f80_0001);
        assert_eq!(errors, ["NaN significand must be non-zero"]);

        let (value, _) = with_cursor("nan", |c| parse_f32(c));
        assert_eq!(value.unwrap().to_bits(), 0x7fc0_0000);

        let (value, _) = with_cursor("-nan:0x123", |c| parse_f64(c));
        assert_eq!(value.unwrap().to_bits(), 0xfff0_0000_0000_0123);
    }

    #[test]
    fn infinities_set_max_exponent_zero_significand() {
        let (value, _) = with_cursor("inf", |c| parse_f32(c));
        assert_eq!(value.unwrap().to_bits(), 0x7f80_0000);
        let (value, _) = with_cursor("-inf", |c| parse_f64(c));
        assert_eq!(value.unwrap().to_bits(), 0xfff0_0000_0000_0000);
    }

    #[test]
    fn decimal_floats_are_strict() {
        assert_eq!(with_cursor("1.5", |c| parse_f64(c)).0, Ok(1.5));
        assert_eq!(with_cursor("-0.0", |c| parse_f64(c)).0.unwrap().to_bits(), 0x8000_0000_0000_0000);
        assert_eq!(with_cursor("1_000.5", |c| parse_f64(c)).0, Ok(1000.5));
        assert_eq!(with_cursor("0.1", |c| parse_f32(c)).0, Ok(0.1f32));

        let (value, errors) = with_cursor("1e400", |c| parse_f64(c));
        assert_eq!(value, Ok(f64::INFINITY));
        assert_eq!(errors, ["float literal is too large"]);
    }

    #[test]
    fn hex_floats_round_to_nearest_even() {
        assert_eq!(with_cursor("0x1p0", |c| parse_f64(c)).0, Ok(1.0));
        assert_eq!(with_cursor("0x1.8p1", |c| parse_f64(c)).0, Ok(3.0));
        assert_eq!(with_cursor("-0x1p-1", |c| parse_f64(c)).0, Ok(-0.5));
        assert_eq!(with_cursor("0xFF", |c| parse_f64(c)).0, Ok(255.0));
        assert_eq!(with_cursor("0xFF_FF", |c| parse_f64(c)).0, Ok(65535.0));
        assert_eq!(
            with_cursor("0x1.fffffep127", |c| parse_f32(c)).0,
            Ok(f32::MAX)
        );
        assert_eq!(
            with_cursor("0x1p-149", |c| parse_f32(c)).0.unwrap().to_bits(),
            1
        );
        // Exactly half the smallest subnormal: ties to even, so zero.
        assert_eq!(
            with_cursor("0x1p-150", |c| parse_f32(c)).0.unwrap().to_bits(),
            0
        );
        // Just above half: rounds up to the smallest subnormal.
        assert_eq!(
            with_cursor("0x1.0000000001p-150", |c| parse_f32(c))
                .0
                .unwrap()
                .to_bits(),
            1
        );
        // 53 significant bits round-trip exactly in f64.
        assert_eq!(
            with_cursor("0x1fffffffffffff", |c| parse_f64(c)).0,
            Ok(9007199254740991.0)
        );

        let (value, errors) = with_cursor("0x1p128", |c| parse_f32(c));
        assert_eq!(value, Ok(f32::INFINITY));
        assert_eq!(errors, ["float literal is too large"]);
    }

    #[test]
    fn v128_lane_forms() {
        let (value, errors) = with_cursor("i32x4 1 2 3 -4", |c| parse_v128(c));
        let value = value.unwrap();
        assert!(errors.is_empty());
        assert_eq!(value.u32_lane(0), 1);
        assert_eq!(value.u32_lane(3), (-4i32) as u32);

        let (value, _) = with_cursor("f64x2 0x1p1 -inf", |c| parse_v128(c));
        let value = value.unwrap();
        assert_eq!(value.u64_lane(0), 2.0f64.to_bits());
        assert_eq!(value.u64_lane(1), f64::NEG_INFINITY.to_bits());

        let (value, errors) = with_cursor("i9x9 1", |c| parse_v128(c));
        assert_eq!(value, Err(Recover));
        assert_eq!(
            errors,
            ["expected 'i8x16', 'i16x8', 'i32x4', 'i64x2', 'f32x4', or 'f64x2'"]
        );
    }

    #[test]
    fn i8x16_full_width() {
        let (value, errors) =
            with_cursor("i8x16 0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 -1", |c| {
                parse_v128(c)
            });
        let value = value.unwrap();
        assert!(errors.is_empty());
        assert_eq!(value.u8_lane(0), 0);
        assert_eq!(value.u8_lane(14), 14);
        assert_eq!(value.u8_lane(15), 0xff);
    }

    proptest! {
        #[test]
        fn decimal_u64_round_trips(value in any::<u64>()) {
            let text = value.to_string();
            let (parsed, errors) = with_cursor(&text, |c| try_parse_u64(c));
            prop_assert_eq!(parsed, Some(value));
            prop_assert!(errors.is_empty());
        }

        #[test]
        fn hex_u64_round_trips(value in any::<u64>()) {
            let text = format!("{value:#x}");
            let (parsed, errors) = with_cursor(&text, |c| try_parse_u64(c));
            prop_assert_eq!(parsed, Some(value));
            prop_assert!(errors.is_empty());
        }

        #[test]
        fn finite_f64_round_trips(value in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
            let text = format!("{value}");
            let (parsed, errors) = with_cursor(&text, |c| parse_f64(c));
            prop_assert_eq!(parsed.unwrap().to_bits(), value.to_bits());
            prop_assert!(errors.is_empty());
        }
    }
}
