use std::fmt;
use std::time::Duration;

/// Parse a chunk length into a [`Duration`].
///
/// Three spellings are accepted:
///
/// * a bare number of minutes: `90`, `2.5`
/// * a clock value: `1:30:00`, `45:00`
/// * unit components: `1h30m`, `90s`, `1.5m`, `500ms` (`ms`, `s`, `m`, `h`),
///   optionally separated by whitespace or `_`, each unit at most once.
///
/// Zero durations are rejected. Precision is limited to whole milliseconds.
pub fn parse_duration(value: &str) -> Result<Duration, DurationParseError> {
    let input = value.trim();
    if input.is_empty() {
        return Err(DurationParseError::Empty);
    }

    let millis = if input.contains(':') {
        parse_clock(input)?
    } else if input.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        parse_decimal(input, Unit::Minute)?
    } else {
        parse_components(input)?
    };

    if millis == 0 {
        return Err(DurationParseError::Zero);
    }
    let millis = u64::try_from(millis).map_err(|_| DurationParseError::TooLarge)?;
    Ok(Duration::from_millis(millis))
}

fn parse_clock(input: &str) -> Result<u128, DurationParseError> {
    let fields: Vec<&str> = input.split(':').collect();
    if fields.len() > 3 {
        return Err(DurationParseError::InvalidClock(input.to_owned()));
    }

    let units = [Unit::Hour, Unit::Minute, Unit::Second];
    let units = &units[units.len() - fields.len()..];
    let mut total = 0u128;

    for (position, (field, unit)) in fields.iter().zip(units).enumerate() {
        let leading = position == 0;
        let last = position == fields.len() - 1;
        let valid = !field.is_empty()
            && field.bytes().all(|b| b.is_ascii_digit() || (last && b == b'.'))
            && (leading || field.split('.').next().is_some_and(|whole| whole.len() == 2));
        if !valid {
            return Err(DurationParseError::InvalidClock(input.to_owned()));
        }

        let millis = parse_decimal(field, *unit)?;
        if !leading && millis >= 60 * unit.millis() {
            return Err(DurationParseError::InvalidClock(input.to_owned()));
        }
        total = total
            .checked_add(millis)
            .ok_or(DurationParseError::TooLarge)?;
    }

    Ok(total)
}

fn parse_components(input: &str) -> Result<u128, DurationParseError> {
    let bytes = input.as_bytes();
    let mut index = 0;
    let mut seen = Vec::with_capacity(4);
    let mut total = 0u128;

    while index < bytes.len() {
        if bytes[index] == b'_' || bytes[index].is_ascii_whitespace() {
            index += 1;
            continue;
        }

        let start = index;
        while index < bytes.len() && (bytes[index].is_ascii_digit() || bytes[index] == b'.') {
            index += 1;
        }
        if start == index {
            return Err(DurationParseError::ExpectedNumber { position: start + 1 });
        }
        let number = &input[start..index];

        let unit_start = index;
        while index < bytes.len() && bytes[index].is_ascii_alphabetic() {
            index += 1;
        }
        let unit = match &input[unit_start..index] {
            "" => {
                return Err(DurationParseError::ExpectedUnit {
                    position: unit_start + 1,
                })
            }
            symbol => Unit::from_symbol(symbol).ok_or_else(|| DurationParseError::UnknownUnit {
                unit: symbol.to_owned(),
            })?,
        };

        if seen.contains(&unit) {
            return Err(DurationParseError::DuplicateUnit { unit });
        }
        seen.push(unit);

        total = total
            .checked_add(parse_decimal(number, unit)?)
            .ok_or(DurationParseError::TooLarge)?;
    }

    Ok(total)
}

/// Milliseconds in `number` (`12`, `1.25`) of `unit`.
fn parse_decimal(number: &str, unit: Unit) -> Result<u128, DurationParseError> {
    let invalid = || DurationParseError::InvalidNumber(number.to_owned());

    let (whole, fraction) = match number.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (number, ""),
    };
    if whole.is_empty() && fraction.is_empty()
        || number.ends_with('.')
        || fraction.contains('.')
    {
        return Err(invalid());
    }

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let mut millis = whole
        .checked_mul(unit.millis())
        .ok_or(DurationParseError::TooLarge)?;

    if !fraction.is_empty() {
        let digits: u32 = fraction.len() as u32;
        let scale = 10u128.checked_pow(digits).ok_or_else(invalid)?;
        let fraction: u128 = fraction.parse().map_err(|_| invalid())?;
        let scaled = fraction
            .checked_mul(unit.millis())
            .ok_or(DurationParseError::TooLarge)?;
        if scaled % scale != 0 {
            return Err(DurationParseError::TooPrecise {
                value: number.to_owned(),
                unit,
            });
        }
        millis = millis
            .checked_add(scaled / scale)
            .ok_or(DurationParseError::TooLarge)?;
    }

    Ok(millis)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DurationParseError {
    Empty,
    ExpectedNumber { position: usize },
    ExpectedUnit { position: usize },
    UnknownUnit { unit: String },
    DuplicateUnit { unit: Unit },
    InvalidNumber(String),
    InvalidClock(String),
    TooPrecise { value: String, unit: Unit },
    Zero,
    TooLarge,
}

impl std::error::Error for DurationParseError {}

impl fmt::Display for DurationParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurationParseError::Empty => write!(f, "duration cannot be empty"),
            DurationParseError::ExpectedNumber { position } => {
                write!(f, "expected a number at position {position}")
            }
            DurationParseError::ExpectedUnit { position } => write!(
                f,
                "expected a unit (ms, s, m, h) at position {position}"
            ),
            DurationParseError::UnknownUnit { unit } => {
                write!(f, "unknown unit '{unit}'; use ms, s, m or h")
            }
            DurationParseError::DuplicateUnit { unit } => {
                write!(f, "unit '{}' appears more than once", unit.symbol())
            }
            DurationParseError::InvalidNumber(number) => write!(f, "invalid number '{number}'"),
            DurationParseError::InvalidClock(value) => write!(
                f,
                "invalid clock value '{value}'; expected [[H:]MM:]SS"
            ),
            DurationParseError::TooPrecise { value, unit } => write!(
                f,
                "'{value}{}' is finer than one millisecond",
                unit.symbol()
            ),
            DurationParseError::Zero => write!(f, "duration must be greater than zero"),
            DurationParseError::TooLarge => write!(f, "duration is too large"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Unit {
    Millisecond,
    Second,
    Minute,
    Hour,
}

impl Unit {
    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "ms" => Some(Unit::Millisecond),
            "s" => Some(Unit::Second),
            "m" => Some(Unit::Minute),
            "h" => Some(Unit::Hour),
            _ => None,
        }
    }

    fn millis(self) -> u128 {
        match self {
            Unit::Millisecond => 1,
            Unit::Second => 1_000,
            Unit::Minute => 60_000,
            Unit::Hour => 3_600_000,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Unit::Millisecond => "ms",
            Unit::Second => "s",
            Unit::Minute => "m",
            Unit::Hour => "h",
        }
    }
}
