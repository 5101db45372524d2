// src/strategy/policy.rs

use crate::error::{Result, SimError};
use crate::model::product::ProductId;

/// What a policy sees when it decides an order for one product.
#[derive(Debug, Clone, Default)]
pub struct OrderContext {
    pub period: usize,
    /// Local inventory position after this period's demand was registered.
    pub inventory_position: f64,
    /// Echelon inventory position (this node plus everything downstream).
    /// Only filled in for echelon policies.
    pub echelon_inventory_position: Option<f64>,
    /// Demand registered at the node this period.
    pub incoming_demand: f64,
}

/// Inventory policies. Stateless beyond their parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Policy {
    /// Order up to `level` every period.
    BaseStock { level: f64 },
    /// Order `quantity` whenever the position is at or below `reorder_point`.
    ReorderPointQuantity { reorder_point: f64, quantity: f64 },
    /// Order up to `order_up_to` whenever the position is at or below `reorder_point`.
    MinMax { reorder_point: f64, order_up_to: f64 },
    /// Base-stock on the echelon inventory position.
    EchelonBaseStock { level: f64 },
    /// Order `quantity` every period.
    FixedQuantity { quantity: f64 },
}

impl Policy {
    pub fn is_echelon(&self) -> bool {
        matches!(self, Policy::EchelonBaseStock { .. })
    }

    pub fn validate(&self, product: ProductId) -> Result<()> {
        let fail = |reason: &str| {
            Err(SimError::PolicyParameter {
                product,
                reason: reason.to_string(),
            })
        };

        match *self {
            Policy::BaseStock { level } | Policy::EchelonBaseStock { level } => {
                if !level.is_finite() || level < 0.0 {
                    return fail("base-stock level must be a non-negative number");
                }
            }
            Policy::ReorderPointQuantity {
                reorder_point,
                quantity,
            } => {
                if !reorder_point.is_finite() {
                    return fail("reorder point must be finite");
                }
                if !quantity.is_finite() || quantity <= 0.0 {
                    return fail("order quantity must be positive");
                }
            }
            Policy::MinMax {
                reorder_point,
                order_up_to,
            } => {
                if !reorder_point.is_finite() || !order_up_to.is_finite() {
                    return fail("min and max must be finite");
                }
                if order_up_to < 0.0 || reorder_point > order_up_to {
                    return fail("need 0 <= max and min <= max");
                }
            }
            Policy::FixedQuantity { quantity } => {
                if !quantity.is_finite() || quantity < 0.0 {
                    return fail("fixed order quantity must be non-negative");
                }
            }
        }
        Ok(())
    }

    /// Quantity to order this period. Never negative.
    pub fn order_quantity(&self, context: &OrderContext) -> f64 {
        let ip = context.inventory_position;
        match *self {
            Policy::BaseStock { level } => (level - ip).max(0.0),
            Policy::ReorderPointQuantity {
                reorder_point,
                quantity,
            } => {
                if ip <= reorder_point {
                    quantity
                } else {
                    0.0
                }
            }
            Policy::MinMax {
                reorder_point,
                order_up_to,
            } => {
                if ip <= reorder_point {
                    (order_up_to - ip).max(0.0)
                } else {
                    0.0
                }
            }
            Policy::EchelonBaseStock { level } => {
                let position = context.echelon_inventory_position.unwrap_or(ip);
                (level - position).max(0.0)
            }
            Policy::FixedQuantity { quantity } => quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::network::NodeId;
    use rstest::rstest;

    fn ctx(ip: f64) -> OrderContext {
        OrderContext {
            inventory_position: ip,
            ..Default::default()
        }
    }

    #[rstest]
    #[case(Policy::BaseStock { level: 20.0 }, 12.0, 8.0)]
    #[case(Policy::BaseStock { level: 20.0 }, 25.0, 0.0)]
    #[case(Policy::BaseStock { level: 20.0 }, -5.0, 25.0)]
    #[case(Policy::ReorderPointQuantity { reorder_point: 5.0, quantity: 30.0 }, 5.0, 30.0)]
    #[case(Policy::ReorderPointQuantity { reorder_point: 5.0, quantity: 30.0 }, 5.5, 0.0)]
    #[case(Policy::MinMax { reorder_point: 4.0, order_up_to: 20.0 }, 3.0, 17.0)]
    #[case(Policy::MinMax { reorder_point: 4.0, order_up_to: 20.0 }, 10.0, 0.0)]
    #[case(Policy::FixedQuantity { quantity: 7.0 }, 100.0, 7.0)]
    fn local_policies(#[case] policy: Policy, #[case] ip: f64, #[case] expected: f64) {
        assert_eq!(policy.order_quantity(&ctx(ip)), expected);
    }

    #[test]
    fn echelon_policy_reads_echelon_position() {
        let policy = Policy::EchelonBaseStock { level: 50.0 };
        let context = OrderContext {
            inventory_position: 10.0,
            echelon_inventory_position: Some(42.0),
            ..Default::default()
        };
        assert_eq!(policy.order_quantity(&context), 8.0);
    }

    #[rstest]
    #[case(Policy::BaseStock { level: -1.0 })]
    #[case(Policy::EchelonBaseStock { level: f64::NAN })]
    #[case(Policy::ReorderPointQuantity { reorder_point: 3.0, quantity: 0.0 })]
    #[case(Policy::MinMax { reorder_point: 10.0, order_up_to: 5.0 })]
    #[case(Policy::FixedQuantity { quantity: -2.0 })]
    fn bad_parameters_are_rejected(#[case] policy: Policy) {
        let product = ProductId::new(NodeId(1), 0);
        assert!(matches!(
            policy.validate(product),
            Err(SimError::PolicyParameter { .. })
        ));
    }
}
