// Copyright 2025 Treeq Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! One-pass statistical accumulators
//!
//! Each per-key accumulator carries two independent single-stream helpers
//! (the second for two-stream aggregates), a single-pass covariance helper,
//! and an "any" slot capturing the first non-empty scalar.

use crate::core::Value;
use crate::parser::AggrKind;

/// Single-stream accumulator: count, min, max, sum, sum of squares
#[derive(Debug, Clone)]
struct BasicAccum {
    count: u64,
    min: f64,
    max: f64,
    sum: f64,
    sum_sq: f64,
}

impl Default for BasicAccum {
    fn default() -> Self {
        BasicAccum {
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            sum_sq: 0.0,
        }
    }
}

impl BasicAccum {
    fn update(&mut self, x: f64) {
        self.count += 1;
        if x < self.min {
            self.min = x;
        }
        if x > self.max {
            self.max = x;
        }
        self.sum += x;
        self.sum_sq += x * x;
    }

    fn sample_variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let n = self.count as f64;
        (self.sum_sq - (self.sum * self.sum) / n) / (n - 1.0)
    }
}

/// Single-pass covariance/correlation using rescaled deltas
#[derive(Debug, Clone, Default)]
struct CovarianceAccum {
    count: u64,
    sum_sq_x: f64,
    sum_sq_y: f64,
    sum_coproduct: f64,
    mean_x: f64,
    mean_y: f64,
}

impl CovarianceAccum {
    fn update(&mut self, x: f64, y: f64) {
        self.count += 1;
        if self.count == 1 {
            self.mean_x = x;
            self.mean_y = y;
        } else {
            let rescale = (self.count - 1) as f64 / self.count as f64;
            let delta_x = x - self.mean_x;
            let delta_y = y - self.mean_y;
            self.sum_sq_x += delta_x * delta_x * rescale;
            self.sum_sq_y += delta_y * delta_y * rescale;
            self.sum_coproduct += delta_x * delta_y * rescale;
            self.mean_x += delta_x / self.count as f64;
            self.mean_y += delta_y / self.count as f64;
        }
    }

    fn covariance(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum_coproduct / self.count as f64
    }

    fn correlation(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        let pop_sd_x = (self.sum_sq_x / n).sqrt();
        let pop_sd_y = (self.sum_sq_y / n).sqrt();
        self.covariance() / (pop_sd_x * pop_sd_y)
    }
}

/// Per-key accumulator for one aggregate operator instance
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    any: Value,
    v1: BasicAccum,
    v2: BasicAccum,
    cov: CovarianceAccum,
}

/// The accumulators for one stored row, indexed by the operator's slot
pub type RowAggregates = Vec<Aggregate>;

impl Aggregate {
    /// Capture the first non-empty scalar seen
    pub fn update_any(&mut self, value: &Value) {
        let empty = match &self.any {
            Value::Unknown => true,
            Value::Str(s) => s.is_empty(),
            _ => false,
        };
        if empty {
            self.any = value.clone();
        }
    }

    pub fn update(&mut self, x: f64) {
        self.v1.update(x);
    }

    pub fn update2(&mut self, x: f64, y: f64) {
        self.v1.update(x);
        self.v2.update(y);
        self.cov.update(x, y);
    }

    /// The finalized aggregate of the given kind
    pub fn result(&self, kind: AggrKind) -> Value {
        match kind {
            AggrKind::Any => self.any.clone(),
            AggrKind::Count => Value::Real(self.v1.count as f64),
            AggrKind::Min => Value::Real(self.v1.min),
            AggrKind::Max => Value::Real(self.v1.max),
            AggrKind::Sum => Value::Real(self.v1.sum),
            AggrKind::Avg => Value::Real(self.v1.sum / self.v1.count as f64),
            AggrKind::Stdev => Value::Real(self.v1.sample_variance().sqrt()),
            AggrKind::Var => Value::Real(self.v1.sample_variance()),
            AggrKind::Cov => Value::Real(self.cov.covariance()),
            AggrKind::Corr => Value::Real(self.cov.correlation()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(values: &[f64]) -> Aggregate {
        let mut aggr = Aggregate::default();
        for &v in values {
            aggr.update(v);
        }
        aggr
    }

    #[test]
    fn test_basic_aggregates() {
        let aggr = feed(&[1.0, 3.0, 4.0]);
        assert_eq!(aggr.result(AggrKind::Sum), Value::Real(8.0));
        assert_eq!(aggr.result(AggrKind::Count), Value::Real(3.0));
        assert_eq!(aggr.result(AggrKind::Min), Value::Real(1.0));
        assert_eq!(aggr.result(AggrKind::Max), Value::Real(4.0));
        let avg = aggr.result(AggrKind::Avg).as_real();
        assert!((avg - 8.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_max_of_negative_values() {
        let aggr = feed(&[-5.0, -2.0, -9.0]);
        assert_eq!(aggr.result(AggrKind::Max), Value::Real(-2.0));
        assert_eq!(aggr.result(AggrKind::Min), Value::Real(-9.0));
    }

    #[test]
    fn test_stdev_sample() {
        let aggr = feed(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        // sample stdev of the classic example set
        let sd = aggr.result(AggrKind::Stdev).as_real();
        assert!((sd - 2.138089935).abs() < 1e-6);
        // fewer than two samples yields zero
        assert_eq!(feed(&[1.0]).result(AggrKind::Stdev), Value::Real(0.0));
    }

    #[test]
    fn test_correlation_perfectly_linear() {
        let mut aggr = Aggregate::default();
        for i in 1..=10 {
            aggr.update2(i as f64, 2.0 * i as f64 + 1.0);
        }
        let corr = aggr.result(AggrKind::Corr).as_real();
        assert!((corr - 1.0).abs() < 1e-9);
        let cov = aggr.result(AggrKind::Cov).as_real();
        assert!(cov > 0.0);
    }

    #[test]
    fn test_any_captures_first_non_empty() {
        let mut aggr = Aggregate::default();
        aggr.update_any(&Value::Str("".into()));
        aggr.update_any(&Value::Str("first".into()));
        aggr.update_any(&Value::Str("second".into()));
        assert_eq!(aggr.result(AggrKind::Any), Value::Str("first".into()));
    }
}
