use scope_types::Direction;

/// Rising/falling/high/low edge detector with hysteresis (§4.2 step 4).
/// `band` is 1% of the device's full range, expressed in raw ADC codes.
pub struct EdgeDetector {
    direction: Direction,
    threshold: i32,
    band: i32,
    state: bool,
}

impl EdgeDetector {
    pub fn new(direction: Direction, threshold: i32, band: i32) -> Self {
        EdgeDetector {
            direction,
            threshold,
            band,
            state: false,
        }
    }

    /// Scans `samples` against the latched state left by the previous call
    /// and returns the indices (relative to the start of `samples`) at
    /// which the configured edge direction fired.
    pub fn scan(&mut self, samples: &[i16]) -> Vec<usize> {
        let mut edges = Vec::new();
        for (i, &raw) in samples.iter().enumerate() {
            let raw = raw as i32;
            match self.direction {
                Direction::Rising | Direction::High => {
                    if !self.state && raw >= self.threshold {
                        edges.push(i);
                        self.state = true;
                    } else if self.state && raw <= self.threshold - self.band {
                        self.state = false;
                    }
                }
                Direction::Falling | Direction::Low => {
                    if !self.state && raw <= self.threshold {
                        edges.push(i);
                        self.state = true;
                    } else if self.state && raw >= self.threshold + self.band {
                        self.state = false;
                    }
                }
            }
        }
        edges
    }
}

/// Digital-bit edge detector: extracts `bit_index` from each digital-port
/// sample and treats `High`/`Low` the same as `Rising`/`Falling` (a bit has
/// no meaningful hysteresis band).
pub struct DigitalEdgeDetector {
    bit_index: u8,
    direction: Direction,
    state: bool,
}

impl DigitalEdgeDetector {
    pub fn new(bit_index: u8, direction: Direction) -> Self {
        DigitalEdgeDetector {
            bit_index,
            direction,
            state: false,
        }
    }

    pub fn scan(&mut self, samples: &[u16]) -> Vec<usize> {
        let mut edges = Vec::new();
        for (i, &word) in samples.iter().enumerate() {
            let level = (word >> self.bit_index) & 1 == 1;
            match self.direction {
                Direction::Rising | Direction::High => {
                    if !self.state && level {
                        edges.push(i);
                    }
                }
                Direction::Falling | Direction::Low => {
                    if self.state && !level {
                        edges.push(i);
                    }
                }
            }
            self.state = level;
        }
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rising_edge_with_hysteresis() {
        let mut det = EdgeDetector::new(Direction::Rising, 100, 10);
        let edges = det.scan(&[0, 50, 99, 100, 101, 95, 89, 100, 101]);
        assert_eq!(edges, vec![3, 7]);
    }

    #[test]
    fn falling_edge_with_hysteresis() {
        let mut det = EdgeDetector::new(Direction::Falling, -100, 10);
        let edges = det.scan(&[0, -50, -99, -100, -101, -95, -89, -100]);
        assert_eq!(edges, vec![3, 7]);
    }

    #[test]
    fn digital_rising_edge() {
        let mut det = DigitalEdgeDetector::new(2, Direction::Rising);
        let edges = det.scan(&[0b000, 0b000, 0b100, 0b100, 0b000, 0b100]);
        assert_eq!(edges, vec![2, 5]);
    }
}
