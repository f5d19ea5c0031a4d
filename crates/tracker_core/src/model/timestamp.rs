use crate::error::AppError;
use time::PrimitiveDateTime;
use time::macros::format_description;

/// Renders `YYYY-MM-DDTHH:MM:SS`, adding a fraction only when one is present.
pub fn format_timestamp(value: PrimitiveDateTime) -> Result<String, AppError> {
    let formatted = if value.nanosecond() == 0 {
        value.format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second]"
        ))
    } else {
        value.format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"
        ))
    };
    formatted.map_err(|err| AppError::invalid_data(err.to_string()))
}

/// Accepts seconds, fractional seconds, or minute precision. A single space may
/// stand in for the `T` separator.
pub fn parse_timestamp(raw: &str) -> Result<PrimitiveDateTime, AppError> {
    let normalized = raw.trim().replacen(' ', "T", 1);

    PrimitiveDateTime::parse(
        &normalized,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    )
    .or_else(|_| {
        PrimitiveDateTime::parse(
            &normalized,
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        )
    })
    .or_else(|_| {
        PrimitiveDateTime::parse(
            &normalized,
            format_description!("[year]-[month]-[day]T[hour]:[minute]"),
        )
    })
    .map_err(|_| {
        AppError::invalid_input(format!(
            "timestamp '{}' must look like YYYY-MM-DDTHH:MM[:SS]",
            raw.trim()
        ))
    })
}
