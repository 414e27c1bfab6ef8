/// Exponential moving average over samples of a stats counter.
#[derive(Debug, Clone)]
pub(crate) struct MovingAverage {
    smoothing_factor: f64,
    average: Option<f64>,
    count: u64,
}

impl MovingAverage {
    /// `smoothing_factor` is the weight of each new sample, between 0 and 1.
    pub fn new(smoothing_factor: f64) -> Self {
        Self {
            smoothing_factor: smoothing_factor.clamp(0.0, 1.0),
            average: None,
            count: 0,
        }
    }

    pub fn update(&mut self, value: f64) -> f64 {
        let average = match self.average {
            Some(average) => average + self.smoothing_factor * (value - average),
            // First sample is taken as is.
            None => value,
        };

        self.average = Some(average);
        self.count += 1;

        average
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_sample_is_average() {
        let mut avg = MovingAverage::new(0.1);
        assert_eq!(avg.count(), 0);
        assert_eq!(avg.update(100.0), 100.0);
        assert_eq!(avg.count(), 1);
    }

    #[test]
    fn moves_towards_samples() {
        let mut avg = MovingAverage::new(0.5);
        avg.update(100.0);
        assert_eq!(avg.update(200.0), 150.0);
        assert_eq!(avg.update(150.0), 150.0);
        assert_eq!(avg.count(), 3);
    }

    #[test]
    fn factor_is_clamped() {
        let mut avg = MovingAverage::new(3.0);
        avg.update(10.0);
        assert_eq!(avg.update(20.0), 20.0);
    }
}
