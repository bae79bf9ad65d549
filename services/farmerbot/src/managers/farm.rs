use tracing::{info, instrument, Span};

use super::Fleet;
use crate::error::FarmerbotResult;
use crate::models::Farm;

/// Defines and reads the farm.
#[derive(Clone)]
pub struct FarmManager {
    fleet: Fleet,
    span: Span,
}

impl FarmManager {
    pub fn new(fleet: Fleet, span: Span) -> Self {
        Self { fleet, span }
    }

    /// Store (or replace) the farm definition.
    #[instrument(parent = &self.span, skip_all, fields(farm_id = %farm.id))]
    pub async fn define(&self, farm: Farm) -> FarmerbotResult<Farm> {
        let _gate = self.fleet.gate.lock().await;
        self.fleet.store.set_farm(&farm).await?;
        info!(public_ips = farm.public_ips, "Farm defined");
        Ok(farm)
    }

    pub async fn get(&self) -> FarmerbotResult<Farm> {
        Ok(self.fleet.store.get_farm().await?)
    }
}
