//! Echo canceller metrics.

/// Running summary of one metric, in dB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistic {
    /// Value over the most recent aggregation window.
    pub instant: i32,
    /// Average over all windows since metrics were enabled.
    pub average: i32,
    /// Largest window value.
    pub maximum: i32,
    /// Smallest window value.
    pub minimum: i32,
}

/// Echo canceller quality metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EchoMetrics {
    /// Residual echo return loss: `ERL + ERLE`.
    pub residual_echo_return_loss: Statistic,
    /// Echo return loss: far-end level over near-end level.
    pub echo_return_loss: Statistic,
    /// Echo return loss enhancement of the linear filter and suppressor.
    pub echo_return_loss_enhancement: Statistic,
    /// Attenuation contributed by the nonlinear suppressor alone.
    pub a_nlp: Statistic,
}

/// Accumulates window values into a [`Statistic`].
#[derive(Debug, Clone, Default)]
pub(crate) struct StatisticTracker {
    sum: f64,
    count: u32,
    instant: f32,
    maximum: f32,
    minimum: f32,
}

impl StatisticTracker {
    pub(crate) fn update(&mut self, value_db: f32) {
        if self.count == 0 {
            self.maximum = value_db;
            self.minimum = value_db;
        } else {
            self.maximum = self.maximum.max(value_db);
            self.minimum = self.minimum.min(value_db);
        }
        self.instant = value_db;
        self.sum += f64::from(value_db);
        self.count = self.count.saturating_add(1);
    }

    pub(crate) fn statistic(&self) -> Statistic {
        if self.count == 0 {
            return Statistic::default();
        }
        Statistic {
            instant: self.instant.round() as i32,
            average: (self.sum / f64::from(self.count)).round() as i32,
            maximum: self.maximum.round() as i32,
            minimum: self.minimum.round() as i32,
        }
    }
}
