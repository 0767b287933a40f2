use std::fmt;

/// Rounds to two decimal places, for percentages shown to the user.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
#[test]
fn test_round2() {
    use assert_approx_eq::assert_approx_eq;

    assert_approx_eq!(round2(43.214_999), 43.21);
    assert_approx_eq!(round2(43.215_001), 43.22);
    assert_approx_eq!(round2(100.0), 100.0);
    assert_approx_eq!(round2(0.004), 0.0);
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

/// Hold-out scoring of predicted win probabilities against what happened.
#[derive(Debug, Default, Clone, Copy)]
pub struct Accuracy {
    len: u32,
    correct: u32,
    error: f64,
}

impl Accuracy {
    pub fn record(&mut self, expected: f64, won: bool) {
        let actual = if won { 1.0 } else { 0.0 };
        self.len += 1;
        if (expected - actual).abs() < 0.5 {
            self.correct += 1;
        }
        self.error += (actual - expected).powi(2);
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn accuracy(&self) -> Option<f64> {
        if self.len == 0 {
            None
        } else {
            Some(f64::from(self.correct) / f64::from(self.len))
        }
    }

    /// Mean squared error of the win probability.
    pub fn brier(&self) -> Option<f64> {
        if self.len == 0 {
            None
        } else {
            Some(self.error / f64::from(self.len))
        }
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.accuracy(), self.brier()) {
            (Some(accuracy), Some(brier)) => {
                write!(f, "correct: {:.4}, brier: {:.4}", accuracy, brier)
            }
            _ => f.write_str("no examples"),
        }
    }
}

#[cfg(test)]
#[test]
fn test_accuracy() {
    use assert_approx_eq::assert_approx_eq;

    let mut acc = Accuracy::default();
    assert_eq!(acc.accuracy(), None);
    assert_eq!(acc.to_string(), "no examples");

    acc.record(0.9, true);
    acc.record(0.2, false);
    acc.record(0.7, false);
    acc.record(0.5, true);
    assert_eq!(acc.len(), 4);
    assert_approx_eq!(acc.accuracy().unwrap(), 0.5);
    assert_approx_eq!(acc.brier().unwrap(), (0.01 + 0.04 + 0.49 + 0.25) / 4.0);
}
