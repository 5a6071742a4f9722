/*!
 * Duration Strings
 *
 * Parses human duration strings such as `"1m 30s"` or `"250ms"` into
 * milliseconds for `control(SET_TIMER)`.
 *
 * Tokens are whitespace separated. Each token is an integer followed by an
 * optional unit: `ms`, `s`, `m` or `h`. A missing or unrecognised unit
 * counts as seconds. The total is the sum of all tokens.
 */

use miette::Diagnostic;
use thiserror::Error;

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;

/// Duration parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum DurationParseError {
    #[error("No duration given")]
    #[diagnostic(code(duration::empty), help("Try something like \"1m 30s\", 45s or 1h."))]
    Empty,

    #[error("Invalid duration token '{0}'")]
    #[diagnostic(
        code(duration::invalid_token),
        help("Each token needs a leading integer, e.g. 500ms, 10s, 2m, 1h.")
    )]
    InvalidToken(String),

    #[error("Duration is too large")]
    #[diagnostic(code(duration::overflow))]
    Overflow,
}

/// Multiplier for a unit suffix
fn unit_multiplier(unit: &str) -> i64 {
    match unit {
        "ms" => 1,
        "s" => MS_PER_SECOND,
        "m" => MS_PER_MINUTE,
        "h" => MS_PER_HOUR,
        // Unit-less and unknown units are seconds
        _ => MS_PER_SECOND,
    }
}

/// Milliseconds for a single token
fn parse_token(token: &str) -> Result<i64, DurationParseError> {
    let sign_len = usize::from(token.starts_with(['+', '-']));
    let digits_end = token[sign_len..]
        .find(|c: char| !c.is_ascii_digit())
        .map(|i| i + sign_len)
        .unwrap_or(token.len());

    if digits_end == sign_len {
        return Err(DurationParseError::InvalidToken(token.to_string()));
    }

    let value: i64 = token[..digits_end]
        .parse()
        .map_err(|_| DurationParseError::Overflow)?;

    value
        .checked_mul(unit_multiplier(&token[digits_end..]))
        .ok_or(DurationParseError::Overflow)
}

/// Parse a duration string into total milliseconds
///
/// ```
/// use timer_device::parse_duration;
///
/// assert_eq!(parse_duration("1m 30s").unwrap(), 90_000);
/// assert_eq!(parse_duration("250ms").unwrap(), 250);
/// assert_eq!(parse_duration("2").unwrap(), 2_000);
/// ```
pub fn parse_duration(input: &str) -> Result<i64, DurationParseError> {
    let mut tokens = input.split_whitespace().peekable();
    if tokens.peek().is_none() {
        return Err(DurationParseError::Empty);
    }

    tokens.try_fold(0i64, |total, token| {
        total
            .checked_add(parse_token(token)?)
            .ok_or(DurationParseError::Overflow)
    })
}
