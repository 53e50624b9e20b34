//! Time-varying source descriptions, evaluated by the transient driver.
//!
//! Each variant precomputes the constants its `eval` formula needs so that
//! evaluation at any `t` is a handful of arithmetic ops, not a re-derivation.

use std::f64::consts::PI;

#[derive(Debug, Clone, PartialEq)]
pub enum Waveform {
    Exp(ExpWaveform),
    Sin(SinWaveform),
    Pulse(PulseWaveform),
    Pwl(PwlWaveform),
}

impl Waveform {
    pub fn eval(&self, t: f64) -> f64 {
        match self {
            Waveform::Exp(w) => w.eval(t),
            Waveform::Sin(w) => w.eval(t),
            Waveform::Pulse(w) => w.eval(t),
            Waveform::Pwl(w) => w.eval(t),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpWaveform {
    pub i1: f64,
    pub i2: f64,
    pub td1: f64,
    pub tc1: f64,
    pub td2: f64,
    pub tc2: f64,
    idiff: f64,
}

impl ExpWaveform {
    pub fn new(i1: f64, i2: f64, td1: f64, tc1: f64, td2: f64, tc2: f64) -> Self {
        ExpWaveform {
            i1,
            i2,
            td1,
            tc1,
            td2,
            tc2,
            idiff: i2 - i1,
        }
    }

    fn eval(&self, t: f64) -> f64 {
        if t <= self.td1 {
            self.i1
        } else if t <= self.td2 {
            self.i1 + self.idiff * (1.0 - (-(t - self.td1) / self.tc1).exp())
        } else {
            self.i1
                + self.idiff
                    * ((-(t - self.td2) / self.tc2).exp() - (-(t - self.td1) / self.tc1).exp())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SinWaveform {
    pub i1: f64,
    pub ia: f64,
    pub fr: f64,
    pub td: f64,
    pub df: f64,
    pub ph: f64,
    omega: f64,
    initial_phase: f64,
}

impl SinWaveform {
    pub fn new(i1: f64, ia: f64, fr: f64, td: f64, df: f64, ph: f64) -> Self {
        SinWaveform {
            i1,
            ia,
            fr,
            td,
            df,
            ph,
            omega: 2.0 * PI * fr,
            initial_phase: 2.0 * PI * ph / 360.0,
        }
    }

    fn eval(&self, t: f64) -> f64 {
        if t <= self.td {
            self.i1 + self.ia * self.initial_phase.sin()
        } else {
            self.i1
                + self.ia
                    * (self.omega * (t - self.td) + self.initial_phase).sin()
                    * (-(t - self.td) * self.df).exp()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PulseWaveform {
    pub i1: f64,
    pub i2: f64,
    pub td: f64,
    pub tr: f64,
    pub tf: f64,
    pub pw: f64,
    pub per: f64,
    diff: f64,
    peak: f64,
    fall_start: f64,
    fall_end: f64,
}

impl PulseWaveform {
    pub fn new(i1: f64, i2: f64, td: f64, tr: f64, tf: f64, pw: f64, per: f64) -> Self {
        let peak = td + tr;
        let fall_start = peak + pw;
        let fall_end = fall_start + tf;
        PulseWaveform {
            i1,
            i2,
            td,
            tr,
            tf,
            pw,
            per,
            diff: i2 - i1,
            peak,
            fall_start,
            fall_end,
        }
    }

    fn eval(&self, t: f64) -> f64 {
        let tp = t % self.per;
        if tp <= self.td {
            self.i1
        } else if tp <= self.peak {
            self.i1 + self.diff * (tp - self.td) / self.tr
        } else if tp <= self.fall_start {
            self.i2
        } else if tp <= self.fall_end {
            self.i2 - self.diff * (tp - self.fall_start) / self.tf
        } else {
            self.i1
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PwlWaveform {
    points: Vec<(f64, f64)>,
    slopes: Vec<f64>,
}

impl PwlWaveform {
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        let slopes = points
            .windows(2)
            .map(|w| {
                let (t0, v0) = w[0];
                let (t1, v1) = w[1];
                (v1 - v0) / (t1 - t0)
            })
            .collect();
        PwlWaveform { points, slopes }
    }

    fn eval(&self, t: f64) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        if t <= self.points[0].0 {
            return self.points[0].1;
        }
        let last = self.points.len() - 1;
        if t >= self.points[last].0 {
            return self.points[last].1;
        }
        for i in 0..last {
            let (t0, v0) = self.points[i];
            let (t1, _v1) = self.points[i + 1];
            if t >= t0 && t <= t1 {
                return v0 + self.slopes[i] * (t - t0);
            }
        }
        self.points[last].1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exp_holds_before_td1() {
        let w = ExpWaveform::new(0.0, 1.0, 1.0, 0.5, 2.0, 0.5);
        assert_eq!(w.eval(0.0), 0.0);
        assert_eq!(w.eval(1.0), 0.0);
    }

    #[test]
    fn sin_at_zero_delay() {
        let w = SinWaveform::new(0.0, 1.0, 1.0, 0.0, 0.0, 0.0);
        assert!((w.eval(0.0) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn pulse_at_period_multiples_is_i1() {
        let w = PulseWaveform::new(0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 2.0);
        assert_eq!(w.eval(0.0), 0.0);
        assert_eq!(w.eval(2.0), 0.0);
        assert_eq!(w.eval(4.0), 0.0);
    }

    #[test]
    fn pwl_clamps_outside_range() {
        let w = PwlWaveform::new(vec![(0.0, 1.0), (1.0, 2.0), (2.0, 0.0)]);
        assert_eq!(w.eval(-1.0), 1.0);
        assert_eq!(w.eval(3.0), 0.0);
        assert!((w.eval(0.5) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn pwl_interpolates_between_points() {
        let w = PwlWaveform::new(vec![(0.0, 0.0), (2.0, 4.0)]);
        assert!((w.eval(1.0) - 2.0).abs() < 1e-9);
    }
}
