// src/model/demand.rs

use crate::error::{Result, SimError};
use crate::model::product::ProductId;
use rand::distributions::WeightedIndex;
use rand::Rng;
use rand_distr::{Distribution, Normal, Poisson};

/// What a series source does once the period runs past its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeriesExhaustion {
    /// Wrap around to the start of the series.
    #[default]
    Cycle,
    /// Report [`SimError::ExhaustedDemandSeries`].
    Fail,
}

/// Exogenous customer demand faced by a product.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DemandSource {
    #[default]
    None,
    Normal {
        mean: f64,
        std_dev: f64,
    },
    Poisson {
        mean: f64,
    },
    Uniform {
        low: f64,
        high: f64,
    },
    /// Finite support with the given probabilities.
    CustomDiscrete {
        values: Vec<f64>,
        probabilities: Vec<f64>,
    },
    /// Demand in period `t` is `series[t]`.
    Deterministic {
        series: Vec<f64>,
        on_exhausted: SeriesExhaustion,
    },
    /// Replays observed demand, one observation per period.
    Empirical {
        observations: Vec<f64>,
        on_exhausted: SeriesExhaustion,
    },
}

/// One period's demand draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemandDraw {
    pub quantity: f64,
    /// A negative sample was clipped to zero.
    pub clipped: bool,
}

impl DemandSource {
    /// The same demand every period.
    pub fn constant(quantity: f64) -> Self {
        DemandSource::Deterministic {
            series: vec![quantity],
            on_exhausted: SeriesExhaustion::Cycle,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, DemandSource::None)
    }

    pub fn validate(&self, product: ProductId) -> Result<()> {
        let invalid = |reason: String| {
            Err(SimError::InvalidParameter(format!("demand for product {product}: {reason}")))
        };

        match self {
            DemandSource::None => Ok(()),
            // The mean is not checked here; a non-finite sample is caught when drawn.
            DemandSource::Normal { std_dev, .. } => {
                if std_dev.is_finite() && *std_dev >= 0.0 {
                    Ok(())
                } else {
                    invalid(format!("standard deviation {std_dev} must be non-negative"))
                }
            }
            DemandSource::Poisson { mean } => {
                if mean.is_finite() && *mean > 0.0 {
                    Ok(())
                } else {
                    invalid(format!("poisson mean {mean} must be positive"))
                }
            }
            DemandSource::Uniform { low, high } => {
                if low.is_finite() && high.is_finite() && low <= high {
                    Ok(())
                } else {
                    invalid(format!("uniform range [{low}, {high}] is empty"))
                }
            }
            DemandSource::CustomDiscrete {
                values,
                probabilities,
            } => {
                if values.is_empty() || values.len() != probabilities.len() {
                    return invalid(
                        "values and probabilities must be non-empty and equally long".to_string(),
                    );
                }
                if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
                    return invalid("values must be non-negative".to_string());
                }
                if probabilities.iter().any(|p| !p.is_finite() || *p < 0.0) {
                    return invalid("probabilities must be non-negative".to_string());
                }
                let total: f64 = probabilities.iter().sum();
                if (total - 1.0).abs() > 1e-6 {
                    return invalid(format!("probabilities sum to {total}, not 1"));
                }
                Ok(())
            }
            DemandSource::Deterministic { series, .. }
            | DemandSource::Empirical {
                observations: series,
                ..
            } => {
                if series.is_empty() {
                    return invalid("series is empty".to_string());
                }
                if series.iter().any(|v| !v.is_finite() || *v < 0.0) {
                    return invalid("series values must be non-negative".to_string());
                }
                Ok(())
            }
        }
    }

    /// Draws demand for `period`. Continuous families are clipped at zero.
    pub fn draw<R: Rng + ?Sized>(
        &self,
        period: usize,
        product: ProductId,
        rng: &mut R,
    ) -> Result<DemandDraw> {
        let raw = match self {
            DemandSource::None => 0.0,
            DemandSource::Normal { mean, std_dev } => {
                let normal = Normal::new(*mean, *std_dev).map_err(|e| {
                    SimError::InvalidParameter(format!("demand for product {product}: {e}"))
                })?;
                normal.sample(rng)
            }
            DemandSource::Poisson { mean } => {
                let poisson = Poisson::new(*mean).map_err(|e| {
                    SimError::InvalidParameter(format!("demand for product {product}: {e}"))
                })?;
                poisson.sample(rng)
            }
            DemandSource::Uniform { low, high } => rng.gen_range(*low..=*high),
            DemandSource::CustomDiscrete {
                values,
                probabilities,
            } => {
                let index = WeightedIndex::new(probabilities).map_err(|e| {
                    SimError::InvalidParameter(format!("demand for product {product}: {e}"))
                })?;
                values[index.sample(rng)]
            }
            DemandSource::Deterministic {
                series,
                on_exhausted,
            }
            | DemandSource::Empirical {
                observations: series,
                on_exhausted,
            } => series_value(series, *on_exhausted, period, product)?,
        };

        if !raw.is_finite() {
            return Err(SimError::NumericInstability {
                period,
                node: product.node,
                quantity: "demand",
                value: raw,
            });
        }

        Ok(DemandDraw {
            quantity: raw.max(0.0),
            clipped: raw < 0.0,
        })
    }
}

fn series_value(
    series: &[f64],
    on_exhausted: SeriesExhaustion,
    period: usize,
    product: ProductId,
) -> Result<f64> {
    if series.is_empty() {
        return Err(SimError::InvalidParameter(format!(
            "demand for product {product}: series is empty"
        )));
    }
    match (series.get(period), on_exhausted) {
        (Some(value), _) => Ok(*value),
        (None, SeriesExhaustion::Cycle) => Ok(series[period % series.len()]),
        (None, SeriesExhaustion::Fail) => Err(SimError::ExhaustedDemandSeries {
            product,
            period,
            len: series.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::network::NodeId;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rstest::rstest;

    fn pid() -> ProductId {
        ProductId::new(NodeId(1), 0)
    }

    #[test]
    fn normal_draws_are_reproducible() {
        let source = DemandSource::Normal {
            mean: 10.0,
            std_dev: 2.0,
        };
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for t in 0..50 {
            assert_eq!(
                source.draw(t, pid(), &mut a).unwrap(),
                source.draw(t, pid(), &mut b).unwrap()
            );
        }
    }

    #[test]
    fn negative_normal_draws_are_clipped() {
        let source = DemandSource::Normal {
            mean: -5.0,
            std_dev: 0.5,
        };
        let mut rng = StdRng::seed_from_u64(3);
        let draw = source.draw(0, pid(), &mut rng).unwrap();
        assert_eq!(draw.quantity, 0.0);
        assert!(draw.clipped);
    }

    #[test]
    fn nan_mean_is_numeric_instability() {
        let source = DemandSource::Normal {
            mean: f64::NAN,
            std_dev: 1.0,
        };
        let mut rng = StdRng::seed_from_u64(0);
        let err = source.draw(4, pid(), &mut rng).unwrap_err();
        assert!(matches!(
            err,
            SimError::NumericInstability { period: 4, quantity: "demand", .. }
        ));
    }

    #[rstest]
    #[case(0, 3.0)]
    #[case(2, 7.0)]
    #[case(3, 3.0)]
    #[case(7, 5.0)]
    fn deterministic_series_cycles(#[case] period: usize, #[case] expected: f64) {
        let source = DemandSource::Deterministic {
            series: vec![3.0, 5.0, 7.0],
            on_exhausted: SeriesExhaustion::Cycle,
        };
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(source.draw(period, pid(), &mut rng).unwrap().quantity, expected);
    }

    #[test]
    fn exhausted_series_fails_when_asked_to() {
        let source = DemandSource::Empirical {
            observations: vec![1.0, 2.0],
            on_exhausted: SeriesExhaustion::Fail,
        };
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(source.draw(1, pid(), &mut rng).unwrap().quantity, 2.0);
        assert!(matches!(
            source.draw(2, pid(), &mut rng),
            Err(SimError::ExhaustedDemandSeries { period: 2, len: 2, .. })
        ));
    }

    #[test]
    fn custom_discrete_only_yields_support_values() {
        let source = DemandSource::CustomDiscrete {
            values: vec![0.0, 4.0, 9.0],
            probabilities: vec![0.2, 0.5, 0.3],
        };
        source.validate(pid()).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for t in 0..100 {
            let q = source.draw(t, pid(), &mut rng).unwrap().quantity;
            assert!([0.0, 4.0, 9.0].contains(&q));
        }
    }

    #[rstest]
    #[case(DemandSource::Normal { mean: 1.0, std_dev: -1.0 })]
    #[case(DemandSource::Poisson { mean: 0.0 })]
    #[case(DemandSource::Uniform { low: 5.0, high: 1.0 })]
    #[case(DemandSource::CustomDiscrete { values: vec![1.0], probabilities: vec![0.5] })]
    #[case(DemandSource::Deterministic { series: vec![], on_exhausted: SeriesExhaustion::Cycle })]
    fn invalid_parameters_are_rejected(#[case] source: DemandSource) {
        assert!(matches!(
            source.validate(pid()),
            Err(SimError::InvalidParameter(_))
        ));
    }

    #[test]
    fn poisson_mean_is_roughly_right() {
        let source = DemandSource::Poisson { mean: 6.0 };
        let mut rng = StdRng::seed_from_u64(5);
        let total: f64 = (0..5000)
            .map(|t| source.draw(t, pid(), &mut rng).unwrap().quantity)
            .sum();
        let mean = total / 5000.0;
        assert!((mean - 6.0).abs() < 0.3, "sample mean {mean}");
    }
}
