// src/model/product.rs

use crate::error::{Result, SimError};
use crate::model::demand::DemandSource;
use crate::model::network::NodeId;
use crate::strategy::policy::Policy;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A product as hosted by a particular node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ProductId {
    pub node: NodeId,
    pub index: u32,
}

impl ProductId {
    pub fn new(node: NodeId, index: u32) -> Self {
        Self { node, index }
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.index)
    }
}

/// One line of a bill of materials: `ratio` units of `raw_material` per
/// finished unit.
#[derive(Debug, Clone, PartialEq)]
pub struct BomEntry {
    pub raw_material: ProductId,
    pub ratio: f64,
}

impl BomEntry {
    pub fn new(raw_material: ProductId, ratio: f64) -> Self {
        Self {
            raw_material,
            ratio,
        }
    }
}

/// How the period cost of a product is charged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CostAccounting {
    /// Holding on local on-hand, stockout on backorders, plus in-transit holding.
    Local,
    /// Holding on the echelon inventory level at the echelon rate.
    Echelon { echelon_holding_cost: f64 },
}

/// Period cost as a function of the ending inventory level.
#[derive(Clone)]
pub struct CostFunction(Arc<dyn Fn(f64) -> f64 + Send + Sync>);

impl CostFunction {
    pub fn new(f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn cost(&self, inventory_level: f64) -> f64 {
        (self.0)(inventory_level)
    }
}

impl fmt::Debug for CostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CostFunction(..)")
    }
}

#[derive(Debug, Clone)]
pub struct Product {
    pub index: u32,
    pub name: Option<String>,
    /// Declared bill of materials. Empty means one unit of each predecessor's
    /// single product.
    pub bill_of_materials: Vec<BomEntry>,
    pub policy: Policy,
    pub demand: DemandSource,
    pub holding_cost: f64,
    pub stockout_cost: f64,
    /// Replaces `holding_cost * on_hand` under local accounting. Called with
    /// the ending inventory level when it is positive.
    pub holding_cost_function: Option<CostFunction>,
    /// Replaces `stockout_cost * backorders`. Called with the ending
    /// inventory level when it is negative.
    pub stockout_cost_function: Option<CostFunction>,
    /// Rate charged on units shipped to successors but not yet usable there.
    /// Falls back to `holding_cost`.
    pub in_transit_holding_cost: Option<f64>,
    pub cost_accounting: CostAccounting,
    pub initial_inventory: f64,
    /// Finished units already on order from the suppliers when the run
    /// starts, owed to this node from period 0.
    pub initial_orders: f64,
    /// Finished units arriving in each of the first lead-time periods,
    /// already in transit when the run starts.
    pub initial_shipments: f64,
    pub order_capacity: Option<f64>,
    /// Production of this product is rounded down to whole units.
    pub whole_units: bool,
    supply: Vec<BomEntry>,
}

impl Product {
    /// A product with zero costs, no external demand and a zero base-stock
    /// level, i.e. it reorders exactly what it is asked for.
    pub fn new(index: u32) -> Self {
        Self {
            index,
            name: None,
            bill_of_materials: Vec::new(),
            policy: Policy::BaseStock { level: 0.0 },
            demand: DemandSource::None,
            holding_cost: 0.0,
            stockout_cost: 0.0,
            holding_cost_function: None,
            stockout_cost_function: None,
            in_transit_holding_cost: None,
            cost_accounting: CostAccounting::Local,
            initial_inventory: 0.0,
            initial_orders: 0.0,
            initial_shipments: 0.0,
            order_capacity: None,
            whole_units: true,
            supply: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_raw_material(mut self, raw_material: ProductId, ratio: f64) -> Self {
        self.bill_of_materials.push(BomEntry::new(raw_material, ratio));
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_demand(mut self, demand: DemandSource) -> Self {
        self.demand = demand;
        self
    }

    pub fn with_holding_cost(mut self, rate: f64) -> Self {
        self.holding_cost = rate;
        self
    }

    pub fn with_stockout_cost(mut self, rate: f64) -> Self {
        self.stockout_cost = rate;
        self
    }

    pub fn with_holding_cost_function(
        mut self,
        f: impl Fn(f64) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.holding_cost_function = Some(CostFunction::new(f));
        self
    }

    pub fn with_stockout_cost_function(
        mut self,
        f: impl Fn(f64) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.stockout_cost_function = Some(CostFunction::new(f));
        self
    }

    pub fn with_in_transit_holding_cost(mut self, rate: f64) -> Self {
        self.in_transit_holding_cost = Some(rate);
        self
    }

    pub fn with_cost_accounting(mut self, accounting: CostAccounting) -> Self {
        self.cost_accounting = accounting;
        self
    }

    pub fn with_initial_inventory(mut self, quantity: f64) -> Self {
        self.initial_inventory = quantity;
        self
    }

    pub fn with_initial_orders(mut self, quantity: f64) -> Self {
        self.initial_orders = quantity;
        self
    }

    pub fn with_initial_shipments(mut self, quantity: f64) -> Self {
        self.initial_shipments = quantity;
        self
    }

    pub fn with_order_capacity(mut self, capacity: f64) -> Self {
        self.order_capacity = Some(capacity);
        self
    }

    pub fn with_whole_units(mut self, whole_units: bool) -> Self {
        self.whole_units = whole_units;
        self
    }

    pub fn effective_in_transit_holding_cost(&self) -> f64 {
        self.in_transit_holding_cost.unwrap_or(self.holding_cost)
    }

    /// Local holding cost for the period.
    pub fn local_holding_cost(&self, on_hand: f64, inventory_level: f64) -> f64 {
        match &self.holding_cost_function {
            Some(f) if inventory_level > 0.0 => f.cost(inventory_level),
            Some(_) => 0.0,
            None => self.holding_cost * on_hand,
        }
    }

    pub fn period_stockout_cost(&self, backorders: f64, inventory_level: f64) -> f64 {
        match &self.stockout_cost_function {
            Some(f) if inventory_level < 0.0 => f.cost(inventory_level),
            Some(_) => 0.0,
            None => self.stockout_cost * backorders,
        }
    }

    pub fn uses_echelon_quantities(&self) -> bool {
        self.policy.is_echelon() || matches!(self.cost_accounting, CostAccounting::Echelon { .. })
    }

    /// Resolved supply lines: predecessor products and, for externally
    /// supplied nodes, the external raw material keyed by this product's id.
    /// Empty until the owning network has been built.
    pub fn supply(&self) -> &[BomEntry] {
        &self.supply
    }

    pub(crate) fn set_supply(&mut self, lines: Vec<BomEntry>) {
        self.supply = lines;
    }

    pub(crate) fn validate(&self, id: ProductId) -> Result<()> {
        let rates = [
            ("holding cost", self.holding_cost),
            ("stockout cost", self.stockout_cost),
            ("in-transit holding cost", self.effective_in_transit_holding_cost()),
            ("initial inventory", self.initial_inventory),
            ("initial orders", self.initial_orders),
            ("initial shipments", self.initial_shipments),
        ];
        for (label, value) in rates {
            non_negative(id, label, value)?;
        }
        if let CostAccounting::Echelon {
            echelon_holding_cost,
        } = self.cost_accounting
        {
            non_negative(id, "echelon holding cost", echelon_holding_cost)?;
        }
        if let Some(capacity) = self.order_capacity {
            non_negative(id, "order capacity", capacity)?;
        }
        self.policy.validate(id)?;
        self.demand.validate(id)
    }
}

fn non_negative(id: ProductId, label: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidParameter(format!(
            "product {id}: {label} must be a non-negative number, got {value}"
        )))
    }
}
