//! Charger type detection, following the USB Battery Charging detection sequence.
//!
//! The sequence is
//! 1. ID check: a grounded ID pin means that a B-device is attached.
//! 2. Data contact detection (DCD): a weak pull-up on data-plus, until the port's pull-down wins.
//! 3. Accessory check: an ID resistance identifies an accessory charger adapter.
//! 4. SE1 check: both data lines high identifies a proprietary charger.
//! 5. Primary detection: tells standard downstream ports from charging ports.
//! 6. Secondary detection: tells charging downstream ports from dedicated charging ports.
//!
//! Any failed register access aborts the sequence, which then yields [`ChargerType::None`].
use usbotg_traits::Viewport;

use super::ChargerType;
use crate::ConnectorId;
use crate::config::Timing;
use crate::phy::registers::{ChargerStatus, FunctionControl, IdStatus, OperatingMode, OtgStatus, PowerControl, Register};
use crate::phy::{Phy, PhyError};
use crate::timers::{Timer, TimerType};

/// Charger type classifier that operates a PHY's charger detection circuitry.
#[derive(Debug)]
pub struct Bc12Classifier<V: Viewport, TIMER: Timer> {
    phy: Phy<V, TIMER>,
    timing: Timing,
}

impl<V: Viewport, TIMER: Timer> Bc12Classifier<V, TIMER> {
    /// Create a new classifier on top of a PHY `viewport`.
    pub fn new(viewport: V, timing: Timing) -> Self {
        Self {
            phy: Phy::new(viewport, timing),
            timing,
        }
    }

    /// The hardware access port.
    pub fn phy(&mut self) -> &mut Phy<V, TIMER> {
        &mut self.phy
    }

    /// Read the connector ID.
    pub async fn connector_id(&mut self) -> Result<ConnectorId, PhyError> {
        let status: IdStatus = self.phy.read(Register::IdStatus).await?;
        Ok(status.rid())
    }

    /// Classify the attached charger.
    ///
    /// Never guesses: an incomplete detection yields [`ChargerType::None`].
    pub async fn classify(&mut self) -> ChargerType {
        match self.detect().await {
            Ok(charger_type) => {
                info!("Detected charger type {:?}", charger_type);
                charger_type
            }
            Err(error) => {
                warn!("Charger detection aborted: {:?}", error);
                ChargerType::None
            }
        }
    }

    async fn detect(&mut self) -> Result<ChargerType, PhyError> {
        if self.connector_id().await? == ConnectorId::Grounded {
            return Ok(ChargerType::BDevice);
        }

        self.take_data_lines().await?;

        let contact = self.data_contact_detection().await?;
        if !contact {
            debug!("No data contact within timeout, continue detection");
        }

        match self.connector_id().await? {
            ConnectorId::Grounded => return self.finish(ChargerType::BDevice).await,
            ConnectorId::Floating => (),
            accessory => {
                let charger_type = self.accessory_check(accessory).await?;
                return self.finish(charger_type).await;
            }
        }

        let status: ChargerStatus = self.phy.read(Register::ChargerStatus).await?;
        if status.dp_high() && status.dm_high() {
            return self.finish(ChargerType::Se1).await;
        }

        if !self.primary_detection().await? {
            return self.finish(ChargerType::Sdp).await;
        }

        let charger_type = if self.secondary_detection().await? {
            ChargerType::Dcp
        } else {
            ChargerType::Cdp
        };

        self.finish(charger_type).await
    }

    /// Take software control over the data lines, with the transceiver in non-driving mode.
    async fn take_data_lines(&mut self) -> Result<(), PhyError> {
        let function_control: FunctionControl = self.phy.read(Register::FunctionControl).await?;
        self.phy
            .write(
                Register::FunctionControl,
                function_control.with_operating_mode(OperatingMode::NonDriving),
            )
            .await?;

        self.phy
            .set_bits(Register::PowerControl, PowerControl(0).with_software_control(true))
            .await
    }

    /// Hand the data lines back to the link, unless a dedicated charging port keeps its source.
    async fn finish(&mut self, charger_type: ChargerType) -> Result<ChargerType, PhyError> {
        if charger_type != ChargerType::Dcp {
            self.phy
                .clear_bits(
                    Register::PowerControl,
                    PowerControl(0).with_software_control(true).with_dp_source(true),
                )
                .await?;
        }

        let function_control: FunctionControl = self.phy.read(Register::FunctionControl).await?;
        self.phy
            .write(
                Register::FunctionControl,
                function_control.with_operating_mode(OperatingMode::Normal),
            )
            .await?;

        Ok(charger_type)
    }

    /// Returns `true`, if data contact was detected before the timeout.
    async fn data_contact_detection(&mut self) -> Result<bool, PhyError> {
        let pullup = PowerControl(0).with_dp_weak_pullup(true);
        self.phy.set_bits(Register::PowerControl, pullup).await?;

        let result = self.poll_data_contact().await;

        // The pull-up is removed, no matter the outcome.
        let removed = self.phy.clear_bits(Register::PowerControl, pullup).await;

        let contact = result?;
        removed?;
        Ok(contact)
    }

    async fn poll_data_contact(&mut self) -> Result<bool, PhyError> {
        TimerType::DataContactSettle.get_timer::<TIMER>(&self.timing).await;

        for _ in 0..self.timing.dcd_polls() {
            let status: ChargerStatus = self.phy.read(Register::ChargerStatus).await?;
            if !status.dp_high() {
                return Ok(true);
            }

            TimerType::DataContactPoll.get_timer::<TIMER>(&self.timing).await;
        }

        Ok(false)
    }

    async fn accessory_check(&mut self, id: ConnectorId) -> Result<ChargerType, PhyError> {
        let charger_type = match id {
            ConnectorId::A => {
                let status: OtgStatus = self.phy.read(Register::OtgStatus).await?;
                if status.vbus_valid() {
                    ChargerType::AcaDock
                } else {
                    ChargerType::AcaA
                }
            }
            ConnectorId::B => ChargerType::AcaB,
            ConnectorId::C => ChargerType::AcaC,
            _ => ChargerType::None,
        };

        Ok(charger_type)
    }

    /// Returns `true`, if a charging port was detected.
    async fn primary_detection(&mut self) -> Result<bool, PhyError> {
        let source = PowerControl(0).with_dp_source(true).with_vdat_comparator(true);
        self.phy.set_bits(Register::PowerControl, source).await?;

        TimerType::PrimaryDetection.get_timer::<TIMER>(&self.timing).await;

        let status: ChargerStatus = self.phy.read(Register::ChargerStatus).await?;
        self.phy.clear_bits(Register::PowerControl, source).await?;

        let dm_low = !status.dm_high();
        Ok(status.vdat_detected() && !dm_low)
    }

    /// Returns `true`, if a dedicated charging port was detected.
    async fn secondary_detection(&mut self) -> Result<bool, PhyError> {
        let swap = PowerControl(0).with_swap_dp_dm(true);
        let source = PowerControl(0).with_dp_source(true).with_vdat_comparator(true);

        self.phy.set_bits(Register::PowerControl, swap).await?;
        self.phy.set_bits(Register::PowerControl, source).await?;

        TimerType::SecondaryDetection.get_timer::<TIMER>(&self.timing).await;

        let status: ChargerStatus = self.phy.read(Register::ChargerStatus).await?;
        self.phy.clear_bits(Register::PowerControl, swap).await?;

        let dedicated = status.vdat_detected();
        if !dedicated {
            self.phy.clear_bits(Register::PowerControl, source).await?;
        }

        Ok(dedicated)
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::Bc12Classifier;
    use crate::ConnectorId;
    use crate::charger::ChargerType;
    use crate::config::Timing;
    use crate::dummy::{Attachment, DummyTimer, FakeViewport};

    fn get_classifier(attachment: Attachment) -> Bc12Classifier<FakeViewport, DummyTimer> {
        Bc12Classifier::new(FakeViewport::with_attachment(attachment), Timing::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_grounded_id() {
        let mut classifier = get_classifier(Attachment {
            id: ConnectorId::Grounded,
            ..Attachment::dcp()
        });

        assert_eq!(classifier.classify().await, ChargerType::BDevice);

        // Only the ID was read.
        assert_eq!(classifier.phy().viewport().transactions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sdp() {
        let mut classifier = get_classifier(Attachment::sdp());

        assert_eq!(classifier.classify().await, ChargerType::Sdp);

        let viewport = classifier.phy().viewport();
        assert!(!viewport.power_control().dp_weak_pullup());
        assert!(!viewport.power_control().dp_source());
        assert!(!viewport.power_control().software_control());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cdp() {
        let mut classifier = get_classifier(Attachment::cdp());

        assert_eq!(classifier.classify().await, ChargerType::Cdp);

        let viewport = classifier.phy().viewport();
        assert!(!viewport.power_control().swap_dp_dm());
        assert!(!viewport.power_control().dp_source());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dcp_keeps_source() {
        let mut classifier = get_classifier(Attachment::dcp());

        assert_eq!(classifier.classify().await, ChargerType::Dcp);

        // Polarity is restored, but the voltage source stays asserted.
        let viewport = classifier.phy().viewport();
        assert!(!viewport.power_control().swap_dp_dm());
        assert!(viewport.power_control().dp_source());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dcd_timeout_continues() {
        let mut classifier = get_classifier(Attachment {
            contact_after_polls: None,
            ..Attachment::sdp()
        });

        let start = Instant::now();
        assert_eq!(classifier.classify().await, ChargerType::Sdp);

        // Settle time, the full contact timeout and the primary detection settle time.
        assert!(start.elapsed().as_millis() >= 66 + 750 + 107);
        assert!(!classifier.phy().viewport().power_control().dp_weak_pullup());
    }

    #[tokio::test(start_paused = true)]
    async fn test_se1() {
        let mut classifier = get_classifier(Attachment {
            se1: true,
            ..Attachment::dcp()
        });

        assert_eq!(classifier.classify().await, ChargerType::Se1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accessory() {
        let mut classifier = get_classifier(Attachment {
            id: ConnectorId::B,
            ..Attachment::sdp()
        });
        assert_eq!(classifier.classify().await, ChargerType::AcaB);

        let mut classifier = get_classifier(Attachment {
            id: ConnectorId::A,
            vbus_valid: true,
            ..Attachment::sdp()
        });
        assert_eq!(classifier.classify().await, ChargerType::AcaDock);

        let mut classifier = get_classifier(Attachment {
            id: ConnectorId::A,
            vbus_valid: false,
            ..Attachment::sdp()
        });
        assert_eq!(classifier.classify().await, ChargerType::AcaA);

        let mut classifier = get_classifier(Attachment {
            id: ConnectorId::Unknown,
            ..Attachment::dcp()
        });
        assert_eq!(classifier.classify().await, ChargerType::None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_phy_yields_none() {
        let mut classifier = get_classifier(Attachment::dcp());
        classifier.phy().viewport().stuck = true;

        assert_eq!(classifier.classify().await, ChargerType::None);
        assert!(classifier.phy().is_stuck());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_during_detection_yields_none() {
        let mut classifier = get_classifier(Attachment::dcp());
        // Gets stuck in the middle of primary detection.
        classifier.phy().viewport().stuck_after = Some(12);

        assert_eq!(classifier.classify().await, ChargerType::None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deterministic() {
        for _ in 0..3 {
            let mut classifier = get_classifier(Attachment::cdp());
            assert_eq!(classifier.classify().await, ChargerType::Cdp);
        }
    }
}
