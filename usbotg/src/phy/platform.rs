//! A platform on top of a ULPI-style PHY with charger detection support.
use usbotg_traits::Viewport;

use super::registers::{OtgControl, OtgStatus, PowerControl, Register};
use crate::ConnectorId;
use crate::charger::bc12::Bc12Classifier;
use crate::charger::{Capability, ChargerType};
use crate::config::Timing;
use crate::otg::platform::{Platform, PowerSupply, VbusError};
use crate::timers::Timer;

/// Where VBUS comes from, when this port is host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VbusSupply {
    /// The PHY drives the VBUS switch.
    #[default]
    Phy,
    /// VBUS is switched externally, e.g. by a charger IC.
    External,
}

/// A platform that operates the PHY for all hardware operations.
pub struct PhyPlatform<V: Viewport, TIMER: Timer, S: PowerSupply> {
    classifier: Bc12Classifier<V, TIMER>,
    power_supply: S,
    vbus_supply: VbusSupply,
}

impl<V: Viewport, TIMER: Timer, S: PowerSupply> PhyPlatform<V, TIMER, S> {
    /// Create a new platform.
    pub fn new(viewport: V, power_supply: S, vbus_supply: VbusSupply, timing: Timing) -> Self {
        Self {
            classifier: Bc12Classifier::new(viewport, timing),
            power_supply,
            vbus_supply,
        }
    }

    /// The power supply.
    pub fn power_supply(&mut self) -> &mut S {
        &mut self.power_supply
    }

    /// The charger classifier, and through it the PHY.
    pub fn classifier(&mut self) -> &mut Bc12Classifier<V, TIMER> {
        &mut self.classifier
    }
}

impl<V: Viewport, TIMER: Timer, S: PowerSupply> Platform for PhyPlatform<V, TIMER, S> {
    async fn connector_id(&mut self) -> ConnectorId {
        match self.classifier.connector_id().await {
            Ok(id) => id,
            Err(error) => {
                warn!("Cannot read connector ID: {:?}", error);
                ConnectorId::Floating
            }
        }
    }

    async fn vbus_valid(&mut self) -> bool {
        match self.classifier.phy().read::<OtgStatus>(Register::OtgStatus).await {
            Ok(status) => status.vbus_valid(),
            Err(error) => {
                warn!("Cannot read VBUS status: {:?}", error);
                false
            }
        }
    }

    async fn classify_charger(&mut self) -> ChargerType {
        self.classifier.classify().await
    }

    async fn notify_charger_type(&mut self, capability: &Capability) {
        self.power_supply.notify(capability).await;
    }

    async fn idle_housekeeping(&mut self) {
        // A dedicated charging port leaves the detection source on.
        let sources = PowerControl(0)
            .with_software_control(true)
            .with_dp_source(true)
            .with_vdat_comparator(true);

        if let Err(error) = self.classifier.phy().clear_bits(Register::PowerControl, sources).await {
            warn!("Cannot release charger detection sources: {:?}", error);
        }
    }

    async fn enable_vbus(&mut self, on: bool) -> Result<(), VbusError> {
        if self.vbus_supply == VbusSupply::External {
            return Ok(());
        }

        let drive = OtgControl(0).with_drive_vbus(true);
        let phy = self.classifier.phy();

        if on {
            phy.set_bits(Register::OtgControl, drive).await?;
        } else {
            phy.clear_bits(Register::OtgControl, drive).await?;
        }

        Ok(())
    }
}
