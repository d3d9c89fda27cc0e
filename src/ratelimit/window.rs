//! Window lengths and their header labels.

use std::time::Duration;

use crate::error::{Result, WindowLimitError};

/// Length of a fixed rate limiting window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TimeWindow {
    /// Per-second rate limiting
    Second,
    /// Per-minute rate limiting
    #[default]
    Minute,
    /// Per-hour rate limiting
    Hour,
    /// Per-day rate limiting
    Day,
    /// Any other window length.
    ///
    /// The duration must be non-zero; build it with [`TimeWindow::custom`]
    /// or `TryFrom<Duration>` to have that checked.
    Custom(Duration),
}

impl TimeWindow {
    /// A window of arbitrary length, rejecting zero.
    pub fn custom(duration: Duration) -> Result<Self> {
        if duration.is_zero() {
            return Err(WindowLimitError::InvalidWindow(duration));
        }
        Ok(TimeWindow::Custom(duration))
    }

    /// Get the duration of this time window.
    pub fn duration(&self) -> Duration {
        match self {
            TimeWindow::Second => Duration::from_secs(1),
            TimeWindow::Minute => Duration::from_secs(60),
            TimeWindow::Hour => Duration::from_secs(3600),
            TimeWindow::Day => Duration::from_secs(86400),
            TimeWindow::Custom(duration) => *duration,
        }
    }

    /// Short label advertised in the `x-rate-limit-limit` header.
    pub fn label(&self) -> String {
        match self {
            TimeWindow::Second => "1s".to_string(),
            TimeWindow::Minute => "1m".to_string(),
            TimeWindow::Hour => "1h".to_string(),
            TimeWindow::Day => "1d".to_string(),
            TimeWindow::Custom(duration) if duration.subsec_nanos() == 0 => {
                format!("{}s", duration.as_secs())
            }
            TimeWindow::Custom(duration) => format!("{}ms", duration.as_millis()),
        }
    }
}

impl TryFrom<Duration> for TimeWindow {
    type Error = WindowLimitError;

    fn try_from(duration: Duration) -> Result<Self> {
        match duration.as_secs() {
            _ if duration.subsec_nanos() != 0 => TimeWindow::custom(duration),
            1 => Ok(TimeWindow::Second),
            60 => Ok(TimeWindow::Minute),
            3600 => Ok(TimeWindow::Hour),
            86400 => Ok(TimeWindow::Day),
            _ => TimeWindow::custom(duration),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_window_duration() {
        assert_eq!(TimeWindow::Second.duration(), Duration::from_secs(1));
        assert_eq!(TimeWindow::Minute.duration(), Duration::from_secs(60));
        assert_eq!(TimeWindow::Hour.duration(), Duration::from_secs(3600));
        assert_eq!(TimeWindow::Day.duration(), Duration::from_secs(86400));
        assert_eq!(
            TimeWindow::Custom(Duration::from_secs(90)).duration(),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn test_time_window_label() {
        assert_eq!(TimeWindow::Minute.label(), "1m");
        assert_eq!(TimeWindow::Custom(Duration::from_secs(90)).label(), "90s");
        assert_eq!(TimeWindow::Custom(Duration::from_millis(1500)).label(), "1500ms");
    }

    #[test]
    fn test_time_window_from_duration() {
        assert_eq!(TimeWindow::try_from(Duration::from_secs(60)).unwrap(), TimeWindow::Minute);
        assert_eq!(TimeWindow::try_from(Duration::from_secs(1)).unwrap(), TimeWindow::Second);
        assert_eq!(
            TimeWindow::try_from(Duration::from_secs(30)).unwrap(),
            TimeWindow::Custom(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_zero_length_window_rejected() {
        assert!(matches!(
            TimeWindow::custom(Duration::ZERO),
            Err(WindowLimitError::InvalidWindow(_))
        ));
        assert!(TimeWindow::try_from(Duration::ZERO).is_err());
        assert!(TimeWindow::custom(Duration::from_millis(1)).is_ok());
    }

    #[test]
    fn test_default_is_one_minute() {
        assert_eq!(TimeWindow::default().duration(), Duration::from_secs(60));
    }
}
