//! Implements dummy platforms, drivers, a PHY viewport and a timer for testing.
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use std::vec::Vec;

use usbotg_traits::{Access, Viewport, ViewportStatus};

use crate::ConnectorId;
use crate::charger::{Capability, ChargerType};
use crate::otg::platform::{Platform, PowerSupply, VbusError};
use crate::otg::role::{DriverError, HostDriver, PeripheralDriver};
use crate::phy::registers::{ChargerStatus, IdStatus, OtgControl, OtgStatus, PowerControl, Register};
use crate::timers::Timer;

/// A dummy timer for testing, on top of the (paused) tokio clock.
#[derive(Debug)]
pub struct DummyTimer {}

impl Timer for DummyTimer {
    async fn after_micros(microseconds: u64) {
        tokio::time::sleep(Duration::from_micros(microseconds)).await
    }
}

/// A call into a platform hook or role driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Call {
    IdleHousekeeping,
    ChargingHousekeeping,
    Classify,
    Notify(Capability),
    EnableVbus(bool),
    PrepareStartHost,
    StartHost,
    StopHost,
    AfterStopHost,
    SuspendHost,
    ResumeHost,
    PrepareStartPeripheral,
    StartPeripheral,
    StopPeripheral,
    AfterStopPeripheral,
}

/// Scripted hardware, and a record of all calls made into it.
#[derive(Debug)]
pub struct Bench {
    pub calls: Vec<Call>,
    pub connector_id: ConnectorId,
    pub vbus_valid: bool,
    pub charger_type: ChargerType,
    pub vbus_fails: bool,
    pub host_start_fails: bool,
    pub peripheral_start_fails: bool,
}

impl Default for Bench {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            connector_id: ConnectorId::Floating,
            vbus_valid: false,
            charger_type: ChargerType::None,
            vbus_fails: false,
            host_start_fails: false,
            peripheral_start_fails: false,
        }
    }
}

/// A bench that is shared by the platform and the drivers.
pub type SharedBench = Rc<RefCell<Bench>>;

pub fn get_bench() -> SharedBench {
    Rc::new(RefCell::new(Bench::default()))
}

fn record(bench: &SharedBench, call: Call) {
    bench.borrow_mut().calls.push(call);
}

impl Bench {
    /// Capabilities that were published, in order.
    pub fn published(&self) -> Vec<Capability> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Notify(capability) => Some(*capability),
                _ => None,
            })
            .collect()
    }

    /// Number of occurrences of a call.
    pub fn count(&self, call: Call) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }
}

/// A dummy platform that answers from a bench.
pub struct DummyPlatform {
    pub bench: SharedBench,
}

impl Platform for DummyPlatform {
    async fn connector_id(&mut self) -> ConnectorId {
        self.bench.borrow().connector_id
    }

    async fn vbus_valid(&mut self) -> bool {
        self.bench.borrow().vbus_valid
    }

    async fn classify_charger(&mut self) -> ChargerType {
        record(&self.bench, Call::Classify);
        self.bench.borrow().charger_type
    }

    async fn notify_charger_type(&mut self, capability: &Capability) {
        record(&self.bench, Call::Notify(*capability));
    }

    async fn idle_housekeeping(&mut self) {
        record(&self.bench, Call::IdleHousekeeping);
    }

    async fn charging_housekeeping(&mut self) {
        record(&self.bench, Call::ChargingHousekeeping);
    }

    async fn prepare_start_host(&mut self) {
        record(&self.bench, Call::PrepareStartHost);
    }

    async fn prepare_start_peripheral(&mut self) {
        record(&self.bench, Call::PrepareStartPeripheral);
    }

    async fn after_stop_host(&mut self) {
        record(&self.bench, Call::AfterStopHost);
    }

    async fn after_stop_peripheral(&mut self) {
        record(&self.bench, Call::AfterStopPeripheral);
    }

    async fn enable_vbus(&mut self, on: bool) -> Result<(), VbusError> {
        record(&self.bench, Call::EnableVbus(on));

        if self.bench.borrow().vbus_fails {
            Err(VbusError::Switch)
        } else {
            Ok(())
        }
    }
}

/// A dummy host controller driver.
pub struct DummyHost {
    pub bench: SharedBench,
}

impl HostDriver for DummyHost {
    async fn start(&mut self) -> Result<(), DriverError> {
        record(&self.bench, Call::StartHost);

        if self.bench.borrow().host_start_fails {
            Err(DriverError::StartFailed)
        } else {
            Ok(())
        }
    }

    async fn stop(&mut self) -> Result<(), DriverError> {
        record(&self.bench, Call::StopHost);
        Ok(())
    }

    async fn suspend(&mut self) -> Result<(), DriverError> {
        record(&self.bench, Call::SuspendHost);
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), DriverError> {
        record(&self.bench, Call::ResumeHost);
        Ok(())
    }
}

/// A dummy peripheral controller driver.
pub struct DummyPeripheral {
    pub bench: SharedBench,
}

impl PeripheralDriver for DummyPeripheral {
    async fn start(&mut self) -> Result<(), DriverError> {
        record(&self.bench, Call::StartPeripheral);

        if self.bench.borrow().peripheral_start_fails {
            Err(DriverError::StartFailed)
        } else {
            Ok(())
        }
    }

    async fn stop(&mut self) -> Result<(), DriverError> {
        record(&self.bench, Call::StopPeripheral);
        Ok(())
    }
}

/// A dummy power supply that records capability broadcasts.
#[derive(Default)]
pub struct DummyPowerSupply {
    pub received: Vec<Capability>,
}

impl PowerSupply for DummyPowerSupply {
    async fn notify(&mut self, capability: &Capability) {
        self.received.push(*capability);
    }
}

/// What is plugged into the fake PHY's port, in terms of its electrical behaviour.
#[derive(Debug, Clone, Copy)]
pub struct Attachment {
    pub id: ConnectorId,
    pub vbus_valid: bool,
    /// Number of data contact samples that read data-plus high, before contact is made.
    /// `None` never makes contact.
    pub contact_after_polls: Option<usize>,
    /// Both data lines are pulled high.
    pub se1: bool,
    /// The port reflects the data-plus source onto data-minus.
    pub charging_port: bool,
    /// The port shorts the data lines.
    pub dedicated: bool,
}

impl Attachment {
    pub fn nothing() -> Self {
        Self {
            id: ConnectorId::Floating,
            vbus_valid: false,
            contact_after_polls: None,
            se1: false,
            charging_port: false,
            dedicated: false,
        }
    }

    pub fn sdp() -> Self {
        Self {
            vbus_valid: true,
            contact_after_polls: Some(2),
            ..Self::nothing()
        }
    }

    pub fn cdp() -> Self {
        Self {
            charging_port: true,
            ..Self::sdp()
        }
    }

    pub fn dcp() -> Self {
        Self {
            charging_port: true,
            dedicated: true,
            ..Self::sdp()
        }
    }
}

/// A fake PHY viewport with a register file, which models the attached port from the driven controls.
pub struct FakeViewport {
    registers: [u8; 64],
    pending: Option<Access>,
    attachment: Attachment,
    contact_polls: usize,
    /// Number of busy polls for the next transaction.
    pub busy_polls: usize,
    /// The viewport never completes a transaction.
    pub stuck: bool,
    /// The viewport gets stuck after this number of transactions.
    pub stuck_after: Option<usize>,
    /// Number of started transactions.
    pub transactions: usize,
}

impl FakeViewport {
    pub fn new() -> Self {
        Self::with_attachment(Attachment::nothing())
    }

    pub fn with_attachment(attachment: Attachment) -> Self {
        Self {
            registers: [0; 64],
            pending: None,
            attachment,
            contact_polls: 0,
            busy_polls: 0,
            stuck: false,
            stuck_after: None,
            transactions: 0,
        }
    }

    pub fn attachment(&mut self) -> &mut Attachment {
        &mut self.attachment
    }

    pub fn otg_control(&self) -> OtgControl {
        OtgControl(self.registers[Register::OtgControl.address() as usize])
    }

    pub fn power_control(&self) -> PowerControl {
        PowerControl(self.registers[Register::PowerControl.address() as usize])
    }

    fn charger_status(&mut self) -> ChargerStatus {
        let control = self.power_control();
        let attachment = self.attachment;

        if attachment.se1 {
            return ChargerStatus(0).with_dp_high(true).with_dm_high(true);
        }

        let mut status = ChargerStatus(0);

        if control.dp_weak_pullup() {
            let contact = attachment
                .contact_after_polls
                .is_some_and(|polls| self.contact_polls >= polls);
            self.contact_polls += 1;
            status.set_dp_high(!contact);
        }

        if control.dp_source() && control.vdat_comparator() {
            let reflected = if control.swap_dp_dm() {
                attachment.dedicated
            } else {
                attachment.charging_port
            };

            status.set_vdat_detected(reflected);
            status.set_dm_high(reflected);
        }

        status
    }

    fn read(&mut self, address: u8) -> u8 {
        match address {
            a if a == Register::ChargerStatus.address() => self.charger_status().into(),
            a if a == Register::IdStatus.address() => IdStatus(0).with_rid(self.attachment.id).with_valid(true).into(),
            a if a == Register::OtgStatus.address() => {
                let vbus = self.attachment.vbus_valid || self.otg_control().drive_vbus();
                OtgStatus(0)
                    .with_vbus_valid(vbus)
                    .with_session_valid(vbus)
                    .with_session_end(!vbus)
                    .with_id_ground(self.attachment.id == ConnectorId::Grounded)
                    .into()
            }
            a => self.registers[a as usize],
        }
    }

    fn write(&mut self, address: u8, value: u8) {
        let aliased = [
            Register::FunctionControl,
            Register::OtgControl,
            Register::PowerControl,
        ];

        for register in aliased {
            let base = register.address() as usize;

            if Some(address) == register.set_address() {
                self.registers[base] |= value;
                return;
            }

            if Some(address) == register.clear_address() {
                self.registers[base] &= !value;
                return;
            }
        }

        self.registers[address as usize] = value;
    }
}

impl Viewport for FakeViewport {
    fn start(&mut self, access: Access) {
        self.transactions += 1;
        self.pending = Some(access);

        if self.stuck_after.is_some_and(|limit| self.transactions > limit) {
            self.stuck = true;
        }
    }

    fn status(&mut self) -> ViewportStatus {
        if self.stuck {
            return ViewportStatus::Busy;
        }

        if self.busy_polls > 0 {
            self.busy_polls -= 1;
            return ViewportStatus::Busy;
        }

        match self.pending.take() {
            Some(Access::Read { register }) => ViewportStatus::Done(self.read(register)),
            Some(Access::Write { register, value }) => {
                self.write(register, value);
                ViewportStatus::Done(value)
            }
            None => ViewportStatus::Done(0),
        }
    }
}
