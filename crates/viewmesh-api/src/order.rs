//! The `VehicleOrder` entity served by this API.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use viewmesh_query::Entity;

/// Path segment the order endpoints are mounted under.
pub const ENTITY_PATH: &str = "vehicleorder";

/// Assembly line an order is planned on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssemblyLine {
    /// Plant the line belongs to.
    pub plant_id: Option<String>,
    /// Logistic level of the line.
    pub logistic_level: Option<String>,
    /// Area within the plant.
    pub area_code: Option<String>,
}

/// Production plan of an order in one plant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderPerPlant {
    /// Producing plant.
    pub plant_id: Option<String>,
    /// ISO-8601 date, e.g. `2024-03-01`.
    pub planned_order_start_date: Option<NaiveDate>,
    /// Planned end, same format as the start date.
    pub planned_order_end_date: Option<NaiveDate>,
    /// Line the order is assembled on.
    pub assembly_line: Option<AssemblyLine>,
}

/// A vehicle order, keyed by its order number.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VehicleOrder {
    /// Unique order number, used as the key.
    pub order_number: String,
    /// Vehicle the order builds.
    pub vehicle_id: Option<String>,
    /// Production plan per plant.
    pub order_per_plant: Vec<OrderPerPlant>,
}

impl VehicleOrder {
    /// Order with no plant plan.
    pub fn new(order_number: impl Into<String>, vehicle_id: impl Into<String>) -> Self {
        Self {
            order_number: order_number.into(),
            vehicle_id: Some(vehicle_id.into()),
            order_per_plant: Vec::new(),
        }
    }
}

impl Entity for VehicleOrder {
    fn key(&self) -> String {
        self.order_number.clone()
    }
}
