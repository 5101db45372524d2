// src/model/disruption.rs

use crate::error::{Result, SimError};
use crate::model::network::NodeId;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DisruptionState {
    #[default]
    Up,
    Down,
}

/// Which activity a DOWN node loses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisruptionType {
    /// The node places no orders.
    Ordering,
    /// The node ships nothing to its customers.
    #[default]
    Shipping,
    Both,
    /// Shipments inbound to the node stop advancing.
    Transit,
    /// Shipments still arrive but are held until the node is UP again.
    Receipt,
}

impl DisruptionType {
    pub fn blocks_ordering(self) -> bool {
        matches!(self, DisruptionType::Ordering | DisruptionType::Both)
    }

    pub fn blocks_shipping(self) -> bool {
        matches!(self, DisruptionType::Shipping | DisruptionType::Both)
    }

    pub fn blocks_transit(self) -> bool {
        self == DisruptionType::Transit
    }

    pub fn blocks_receipt(self) -> bool {
        self == DisruptionType::Receipt
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum DisruptionModel {
    #[default]
    None,
    /// Two-state Markov chain.
    Markov {
        disruption_probability: f64,
        recovery_probability: f64,
    },
    /// DOWN exactly in the listed periods.
    Schedule { down_periods: BTreeSet<usize> },
}

/// Disruption process attached to a node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DisruptionProcess {
    pub model: DisruptionModel,
    pub kind: DisruptionType,
}

impl DisruptionProcess {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn markov(kind: DisruptionType, disruption_probability: f64, recovery_probability: f64) -> Self {
        Self {
            model: DisruptionModel::Markov {
                disruption_probability,
                recovery_probability,
            },
            kind,
        }
    }

    pub fn schedule(kind: DisruptionType, down_periods: impl IntoIterator<Item = usize>) -> Self {
        Self {
            model: DisruptionModel::Schedule {
                down_periods: down_periods.into_iter().collect(),
            },
            kind,
        }
    }

    pub fn is_markov(&self) -> bool {
        matches!(self.model, DisruptionModel::Markov { .. })
    }

    /// One Markov transition. Consumes exactly one uniform draw for Markov
    /// processes and none otherwise.
    pub fn advance<R: Rng + ?Sized>(&self, current: DisruptionState, rng: &mut R) -> DisruptionState {
        let DisruptionModel::Markov {
            disruption_probability,
            recovery_probability,
        } = self.model
        else {
            return current;
        };

        let u: f64 = rng.gen();
        match current {
            DisruptionState::Up if u < disruption_probability => DisruptionState::Down,
            DisruptionState::Down if u < recovery_probability => DisruptionState::Up,
            state => state,
        }
    }

    /// State dictated by a schedule, if this process is scheduled.
    pub fn state_at(&self, period: usize) -> Option<DisruptionState> {
        match &self.model {
            DisruptionModel::Schedule { down_periods } if down_periods.contains(&period) => {
                Some(DisruptionState::Down)
            }
            DisruptionModel::Schedule { .. } => Some(DisruptionState::Up),
            _ => None,
        }
    }

    /// State for `period` given the previous period's state.
    pub(crate) fn next_state<R: Rng + ?Sized>(
        &self,
        period: usize,
        previous: DisruptionState,
        rng: &mut R,
    ) -> DisruptionState {
        match self.model {
            DisruptionModel::None => DisruptionState::Up,
            DisruptionModel::Markov { .. } => self.advance(previous, rng),
            DisruptionModel::Schedule { .. } => self.state_at(period).unwrap_or_default(),
        }
    }

    pub(crate) fn validate(&self, node: NodeId) -> Result<()> {
        if let DisruptionModel::Markov {
            disruption_probability,
            recovery_probability,
        } = self.model
        {
            for p in [disruption_probability, recovery_probability] {
                if !(0.0..=1.0).contains(&p) {
                    return Err(SimError::InvalidParameter(format!(
                        "node {node}: disruption probability {p} is outside [0, 1]"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn certain_transitions_flip_state() {
        let process = DisruptionProcess::markov(DisruptionType::Both, 1.0, 1.0);
        let mut rng = StdRng::seed_from_u64(9);
        let down = process.advance(DisruptionState::Up, &mut rng);
        assert_eq!(down, DisruptionState::Down);
        assert_eq!(process.advance(down, &mut rng), DisruptionState::Up);
    }

    #[test]
    fn zero_probabilities_never_move() {
        let process = DisruptionProcess::markov(DisruptionType::Shipping, 0.0, 0.0);
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..100 {
            assert_eq!(process.advance(DisruptionState::Up, &mut rng), DisruptionState::Up);
            assert_eq!(
                process.advance(DisruptionState::Down, &mut rng),
                DisruptionState::Down
            );
        }
    }

    #[test]
    fn long_run_down_fraction_matches_stationary_distribution() {
        let process = DisruptionProcess::markov(DisruptionType::Shipping, 0.1, 0.4);
        let mut rng = StdRng::seed_from_u64(21);
        let mut state = DisruptionState::Up;
        let mut down = 0usize;
        let periods = 20_000;
        for _ in 0..periods {
            state = process.advance(state, &mut rng);
            if state == DisruptionState::Down {
                down += 1;
            }
        }
        // Stationary P(DOWN) = a / (a + r) = 0.2
        let fraction = down as f64 / periods as f64;
        assert!((fraction - 0.2).abs() < 0.02, "down fraction {fraction}");
    }

    #[test]
    fn schedule_is_deterministic() {
        let process = DisruptionProcess::schedule(DisruptionType::Shipping, [2, 3]);
        let mut rng = StdRng::seed_from_u64(0);
        let states: Vec<_> = (0..5)
            .map(|t| process.next_state(t, DisruptionState::Up, &mut rng))
            .collect();
        assert_eq!(
            states,
            vec![
                DisruptionState::Up,
                DisruptionState::Up,
                DisruptionState::Down,
                DisruptionState::Down,
                DisruptionState::Up,
            ]
        );
    }

    #[test]
    fn type_flags() {
        assert!(DisruptionType::Both.blocks_ordering());
        assert!(DisruptionType::Both.blocks_shipping());
        assert!(!DisruptionType::Ordering.blocks_shipping());
        assert!(DisruptionType::Transit.blocks_transit());
        assert!(!DisruptionType::Transit.blocks_receipt());
    }

    #[test]
    fn out_of_range_probability_is_invalid() {
        let process = DisruptionProcess::markov(DisruptionType::Shipping, 1.5, 0.5);
        assert!(process.validate(NodeId(0)).is_err());
    }
}
