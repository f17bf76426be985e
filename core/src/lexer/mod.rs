//! The lexer: a deterministic state machine over byte input.
//!
//! Each call to [`scan`] advances an in/out [`Token`] record by one lexeme.
//! `*Matching` states are intermediate; the rest are accept states. Keyword
//! recognition happens at accept time, so `fals` stays an identifier.
//! Comment tokens are emitted for diagnostics; [`scan_filtered`] is the
//! filter layer callers actually use.
//!
//! Numeric literals are accumulated digit by digit into the token record and
//! combined at accept time as `(integer + fraction) * 10^(sign * exponent)`.
//! String escapes are left undecoded here; the compiler decodes them when it
//! copies the literal into the program image.

pub mod token;


pub use token::{Token, TokenState};

use hashbrown::HashMap;
use once_cell::sync::Lazy;

use crate::compiler::CompileError;

static KEYWORDS: Lazy<HashMap<&'static str, TokenState>> = Lazy::new(|| {
    HashMap::from_iter([
        ("null", TokenState::Null),
        ("true", TokenState::True),
        ("false", TokenState::False),
        ("let", TokenState::Let),
        ("if", TokenState::If),
        ("else", TokenState::Else),
        ("while", TokenState::While),
        ("do", TokenState::Do),
        ("for", TokenState::For),
        ("break", TokenState::Break),
        ("continue", TokenState::Continue),
        ("function", TokenState::Function),
        ("return", TokenState::Return),
        ("in", TokenState::In),
        ("of", TokenState::Of),
        ("typeof", TokenState::Typeof),
        ("delete", TokenState::Delete),
        ("try", TokenState::Try),
        ("catch", TokenState::Catch),
        // reserved so it cannot be used as an identifier
        ("finally", TokenState::Finally),
        ("throw", TokenState::Throw),
    ])
});

fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

fn is_identifier_first(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

fn is_identifier_rest(byte: u8) -> bool {
    is_identifier_first(byte) || byte.is_ascii_digit()
}

fn accept(source: &str, token: &mut Token) -> Result<(), CompileError> {
    if token.state == TokenState::Identifier {
        if let Some(&keyword) = KEYWORDS.get(token.text(source)) {
            token.state = keyword;
        }
    }
    Ok(())
}

/// Advance `token` to the next lexeme, comments included.
pub fn scan(source: &str, token: &mut Token) -> Result<(), CompileError> {
    use TokenState::*;
    let src = source.as_bytes();
    while (token.tail_offset as usize) < src.len() {
        if token.state == Searching {
            // the searching state inspects the head byte, which is inside
            // the token; every other state inspects the byte one past it
            token.head_offset = token.tail_offset;
            token.head_line = token.tail_line;
            token.tail_offset += 1;
            let head = src[token.head_offset as usize];
            if is_space(head) {
                if head == b'\n' {
                    token.tail_line += 1;
                }
            } else if is_identifier_first(head) {
                token.state = IdentifierMatching;
            } else if head == b'/' {
                token.state = DivisionMatching;
            } else if head == b'-' {
                token.state = MinusMatching;
            } else if head.is_ascii_digit() {
                token.reset_number();
                token.accumulate_integer(head);
                token.state = NumberMatching;
            } else if head == b'+' {
                token.state = PlusMatching;
            } else if head == b'*' {
                token.state = MultiplicationMatching;
            } else if head == b'(' {
                token.state = LeftParenthesis;
                return accept(source, token);
            } else if head == b')' {
                token.state = RightParenthesis;
                return accept(source, token);
            } else if head == b'[' {
                token.state = LeftBracket;
                return accept(source, token);
            } else if head == b']' {
                token.state = RightBracket;
                return accept(source, token);
            } else if head == b'{' {
                token.state = LeftBrace;
                return accept(source, token);
            } else if head == b'}' {
                token.state = RightBrace;
                return accept(source, token);
            } else if head == b'"' {
                token.state = StringMatching;
            } else if head == b':' {
                token.state = ColonMatching;
            } else if head == b',' {
                token.state = Comma;
                return accept(source, token);
            } else if head == b'=' {
                token.state = AssignmentMatching;
            } else if head == b'<' {
                token.state = LessThanMatching;
            } else if head == b'>' {
                token.state = GreaterThanMatching;
            } else if head == b'!' {
                token.state = NotMatching;
            } else if head == b'&' {
                token.state = AndMatching;
            } else if head == b'|' {
                token.state = OrMatching;
            } else if head == b'%' {
                token.state = ModMatching;
            } else if head == b';' {
                token.state = Semicolon;
                return accept(source, token);
            } else if head == b'.' {
                token.state = OneDotMatching;
            } else if head == b'?' {
                token.state = QuestionMatching;
            } else if head == 0 {
                // a trailing NUL can sneak in from host buffers
                token.state = EndOfFile;
                return accept(source, token);
            } else {
                return Err(CompileError::at(source, token, "Illegal character"));
            }
        } else {
            let next = src[token.tail_offset as usize];
            match token.state {
                IdentifierMatching => {
                    if is_identifier_rest(next) {
                        token.tail_offset += 1;
                    } else {
                        token.state = Identifier;
                        return accept(source, token);
                    }
                }
                DivisionMatching => {
                    if next == b'/' {
                        token.tail_offset += 1;
                        token.state = LineCommentMatchingNewLine;
                    } else if next == b'*' {
                        token.tail_offset += 1;
                        token.state = BlockCommentMatchingEndStar;
                    } else if next == b'=' {
                        token.tail_offset += 1;
                        token.state = DivisionAssignment;
                        return accept(source, token);
                    } else {
                        token.state = Division;
                        return accept(source, token);
                    }
                }
                LineCommentMatchingNewLine => {
                    if next == b'\n' {
                        token.tail_line += 1;
                        token.tail_offset += 1;
                        token.state = LineComment;
                        return accept(source, token);
                    } else {
                        token.tail_offset += 1;
                    }
                }
                BlockCommentMatchingEndStar => {
                    if next == b'*' {
                        token.tail_offset += 1;
                        token.state = BlockCommentMatchingEndSlash;
                    } else {
                        if next == b'\n' {
                            token.tail_line += 1;
                        }
                        token.tail_offset += 1;
                    }
                }
                BlockCommentMatchingEndSlash => {
                    if next == b'/' {
                        token.tail_offset += 1;
                        token.state = BlockComment;
                        return accept(source, token);
                    } else {
                        if next == b'\n' {
                            token.tail_line += 1;
                        }
                        token.tail_offset += 1;
                        token.state = BlockCommentMatchingEndStar;
                    }
                }
                NumberMatching => {
                    // matches from the 2nd integer digit, to reject 0-led
                    if next.is_ascii_digit() {
                        if token.integer_part() == 0.0 {
                            return Err(CompileError::at(
                                source,
                                token,
                                "Interger part starting with 0 cannot follow any other digits",
                            ));
                        }
                        token.accumulate_integer(next);
                        token.tail_offset += 1;
                    } else if next == b'.' {
                        token.tail_offset += 1;
                        token.state = NumberMatchingFractionFirst;
                    } else if next == b'E' || next == b'e' {
                        token.tail_offset += 1;
                        token.state = NumberMatchingExponentFirst;
                    } else if is_identifier_first(next) {
                        token.tail_offset += 1;
                        return Err(CompileError::at(
                            source,
                            token,
                            "Identifier starts immediately after numeric literal",
                        ));
                    } else {
                        token.finish_number();
                        token.state = Number;
                        return accept(source, token);
                    }
                }
                NumberMatchingFractionFirst => {
                    // fractions may start with zeros, so absence cannot be
                    // detected by == 0 like the integer part
                    if next.is_ascii_digit() {
                        token.accumulate_fraction(next);
                        token.state = NumberMatchingFractionRest;
                        token.tail_offset += 1;
                    } else {
                        return Err(CompileError::at(source, token, "Missing fraction"));
                    }
                }
                NumberMatchingFractionRest => {
                    if next.is_ascii_digit() {
                        token.accumulate_fraction(next);
                        token.tail_offset += 1;
                    } else if next == b'E' || next == b'e' {
                        token.tail_offset += 1;
                        token.state = NumberMatchingExponentFirst;
                    } else if is_identifier_first(next) {
                        token.tail_offset += 1;
                        return Err(CompileError::at(
                            source,
                            token,
                            "Identifier starts immediately after numeric literal",
                        ));
                    } else {
                        token.finish_number();
                        token.state = Number;
                        return accept(source, token);
                    }
                }
                NumberMatchingExponentFirst => {
                    if next == b'+' || next == b'-' {
                        if next == b'-' {
                            token.negate_exponent();
                        }
                        token.tail_offset += 1;
                        token.state = NumberMatchingExponentNumberFirst;
                    } else if next.is_ascii_digit() {
                        token.accumulate_exponent(next);
                        token.tail_offset += 1;
                        token.state = NumberMatchingExponentRest;
                    } else {
                        return Err(CompileError::at(source, token, "Missing exponent"));
                    }
                }
                NumberMatchingExponentNumberFirst => {
                    if next.is_ascii_digit() {
                        token.accumulate_exponent(next);
                        token.tail_offset += 1;
                        token.state = NumberMatchingExponentRest;
                    } else {
                        return Err(CompileError::at(source, token, "Missing exponent"));
                    }
                }
                NumberMatchingExponentRest => {
                    if next.is_ascii_digit() {
                        token.accumulate_exponent(next);
                        token.tail_offset += 1;
                    } else if is_identifier_first(next) {
                        token.tail_offset += 1;
                        return Err(CompileError::at(
                            source,
                            token,
                            "Identifier starts immediately after numeric literal",
                        ));
                    } else {
                        token.finish_number();
                        token.state = Number;
                        return accept(source, token);
                    }
                }
                StringMatching => {
                    if next == b'\\' {
                        token.tail_offset += 1;
                        token.state = StringMatchingControl;
                    } else if next == b'"' {
                        token.tail_offset += 1;
                        token.state = String;
                        return accept(source, token);
                    } else if next == b'\n' {
                        return Err(CompileError::at(
                            source,
                            token,
                            "Line break is not allowed inside string literal",
                        ));
                    } else {
                        token.tail_offset += 1;
                    }
                }
                StringMatchingControl => {
                    token.tail_offset += 1;
                    token.state = StringMatching;
                }
                ColonMatching => {
                    if next == b':' {
                        token.tail_offset += 1;
                        token.state = DoubleColon;
                        return accept(source, token);
                    } else {
                        token.state = Colon;
                        return accept(source, token);
                    }
                }
                AssignmentMatching => {
                    if next == b'=' {
                        token.tail_offset += 1;
                        token.state = EqualTo;
                        return accept(source, token);
                    } else {
                        token.state = Assignment;
                        return accept(source, token);
                    }
                }
                LessThanMatching => {
                    if next == b'=' {
                        token.tail_offset += 1;
                        token.state = LessThanOrEqualTo;
                        return accept(source, token);
                    } else {
                        token.state = LessThan;
                        return accept(source, token);
                    }
                }
                GreaterThanMatching => {
                    if next == b'=' {
                        token.tail_offset += 1;
                        token.state = GreaterThanOrEqualTo;
                        return accept(source, token);
                    } else {
                        token.state = GreaterThan;
                        return accept(source, token);
                    }
                }
                NotMatching => {
                    if next == b'=' {
                        token.tail_offset += 1;
                        token.state = NotEqualTo;
                        return accept(source, token);
                    } else {
                        token.state = Not;
                        return accept(source, token);
                    }
                }
                AndMatching => {
                    if next == b'&' {
                        token.tail_offset += 1;
                        token.state = And;
                        return accept(source, token);
                    } else {
                        return Err(CompileError::at(
                            source,
                            token,
                            "Unfinished logical && operator",
                        ));
                    }
                }
                OrMatching => {
                    if next == b'|' {
                        token.tail_offset += 1;
                        token.state = Or;
                        return accept(source, token);
                    } else {
                        return Err(CompileError::at(
                            source,
                            token,
                            "Unfinished logical || operator",
                        ));
                    }
                }
                OneDotMatching => {
                    if next == b'.' {
                        token.tail_offset += 1;
                        token.state = TwoDotMatching;
                    } else {
                        token.state = MemberAccess;
                        return accept(source, token);
                    }
                }
                TwoDotMatching => {
                    if next == b'.' {
                        token.tail_offset += 1;
                        token.state = Spread;
                        return accept(source, token);
                    } else {
                        return Err(CompileError::at(
                            source,
                            token,
                            "Unfinished spread ... operator",
                        ));
                    }
                }
                QuestionMatching => {
                    if next == b'.' {
                        token.tail_offset += 1;
                        token.state = OptionalChaining;
                        return accept(source, token);
                    } else {
                        token.state = Question;
                        return accept(source, token);
                    }
                }
                MinusMatching => {
                    if next == b'=' {
                        token.tail_offset += 1;
                        token.state = MinusAssignment;
                        return accept(source, token);
                    } else if next == b'-' {
                        token.tail_offset += 1;
                        token.state = MinusMinus;
                        return accept(source, token);
                    } else {
                        token.state = Minus;
                        return accept(source, token);
                    }
                }
                PlusMatching => {
                    if next == b'=' {
                        token.tail_offset += 1;
                        token.state = PlusAssignment;
                        return accept(source, token);
                    } else if next == b'+' {
                        token.tail_offset += 1;
                        token.state = PlusPlus;
                        return accept(source, token);
                    } else {
                        token.state = Plus;
                        return accept(source, token);
                    }
                }
                MultiplicationMatching => {
                    if next == b'=' {
                        token.tail_offset += 1;
                        token.state = MultiplicationAssignment;
                        return accept(source, token);
                    } else if next == b'*' {
                        token.tail_offset += 1;
                        token.state = ExponentiationMatching;
                    } else {
                        token.state = Multiplication;
                        return accept(source, token);
                    }
                }
                ExponentiationMatching => {
                    if next == b'=' {
                        token.tail_offset += 1;
                        token.state = ExponentiationAssignment;
                        return accept(source, token);
                    } else {
                        token.state = Exponentiation;
                        return accept(source, token);
                    }
                }
                ModMatching => {
                    if next == b'=' {
                        token.tail_offset += 1;
                        token.state = ModAssignment;
                        return accept(source, token);
                    } else {
                        token.state = Mod;
                        return accept(source, token);
                    }
                }
                // accept states re-enter the search on the next call
                _ => token.state = Searching,
            }
        }
    }
    // remaining content before end of input
    match token.state {
        IdentifierMatching => token.state = Identifier,
        DivisionMatching => token.state = Division,
        LineCommentMatchingNewLine => token.state = LineComment,
        BlockCommentMatchingEndStar | BlockCommentMatchingEndSlash => {
            return Err(CompileError::at(source, token, "Unfinished block comment"));
        }
        NumberMatchingFractionFirst => {
            return Err(CompileError::at(source, token, "Missing fraction"));
        }
        NumberMatchingExponentFirst | NumberMatchingExponentNumberFirst => {
            return Err(CompileError::at(source, token, "Missing exponent"));
        }
        NumberMatching | NumberMatchingFractionRest | NumberMatchingExponentRest => {
            token.finish_number();
            token.state = Number;
        }
        StringMatching | StringMatchingControl => {
            return Err(CompileError::at(source, token, "Unfinished string"));
        }
        ColonMatching => token.state = Colon,
        AssignmentMatching => token.state = Assignment,
        LessThanMatching => token.state = LessThan,
        GreaterThanMatching => token.state = GreaterThan,
        NotMatching => token.state = Not,
        AndMatching => {
            return Err(CompileError::at(
                source,
                token,
                "Unfinished logical && operator",
            ));
        }
        OrMatching => {
            return Err(CompileError::at(
                source,
                token,
                "Unfinished logical || operator",
            ));
        }
        OneDotMatching => token.state = MemberAccess,
        TwoDotMatching => {
            return Err(CompileError::at(
                source,
                token,
                "Unfinished spread ... operator",
            ));
        }
        QuestionMatching => token.state = Question,
        MinusMatching => token.state = Minus,
        PlusMatching => token.state = Plus,
        MultiplicationMatching => token.state = Multiplication,
        ExponentiationMatching => token.state = Exponentiation,
        ModMatching => token.state = Mod,
        EndOfFile => {
            // recalling after the end is a caller error
            return Err(CompileError::at(source, token, "End of file"));
        }
        _ => {
            // final accept state already delivered; report end of input
            token.head_offset = token.tail_offset;
            token.head_line = token.tail_line;
            token.state = EndOfFile;
        }
    }
    accept(source, token)
}

/// Advance past comment tokens; this is what the compiler consumes.
pub fn scan_filtered(source: &str, token: &mut Token) -> Result<(), CompileError> {
    loop {
        scan(source, token)?;
        if !matches!(token.state, TokenState::LineComment | TokenState::BlockComment) {
            return Ok(());
        }
    }
}
