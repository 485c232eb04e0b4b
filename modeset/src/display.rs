//! Display device context
//!
//! Owns the register file, both heads and every output created from the
//! firmware routing table, and drives the whole mode-setting flow:
//!
//! ```text
//! pre_init -> init -> create_outputs
//!     enable_output(o, head) ... mode_set(head, mode)
//!         validate -> fixup -> prepare (unbound outputs off)
//!         -> head methods -> output methods -> commit (0x80)
//!             supervisor class 2: program PLL + clock limits
//! shutdown
//! ```
//!
//! All hardware access is serialized through `&mut self`; hosts that share
//! the context wrap it in [`LockedDisplay`].

use alloc::vec::Vec;

use crate::channel::{CommandPoll, CoreChannel, Method, MethodList, Step, SupervisorEvent};
use crate::config::DisplayConfig;
use crate::crtc::{Crtc, Head};
use crate::edid::Edid;
use crate::error::{DispError, DispResult, WaitSite};
use crate::i2c::I2cBus;
use crate::mode::DisplayMode;
use crate::output::{dac, sor, ConnectionStatus, DpmsMode, ModeStatus, Output, OutputKind, PanelType};
use crate::pll::PllParams;
use crate::poll::{self, PollBudget};
use crate::regs::{self, mthd, RegisterAccess, SupervisorStatus};
use crate::routing::{PortMap, NUM_DACS, NUM_SORS};

/// Display context shared between threads of the host driver.
pub type LockedDisplay<R> = spin::Mutex<Display<R>>;

/// Boot-time transmitter and head state copied into the core channel
/// shadow registers: `(shadow, live)`.
const SHADOW_COPIES: [(u32, u32); 14] = [
    (0x610184, 0x614004),
    (0x610190, 0x616100),
    (0x6101A0, 0x616900),
    (0x610194, 0x616104),
    (0x6101A4, 0x616904),
    (0x610198, 0x616108),
    (0x6101A8, 0x616908),
    (0x61019C, 0x61610C),
    (0x6101AC, 0x61690C),
    (0x6101D0, 0x61A000),
    (0x6101D4, 0x61A800),
    (0x6101D8, 0x61B000),
    (0x6101E0, 0x61C000),
    (0x6101E4, 0x61C800),
];

/// SOR defaults armed before the core channel comes up, one block per SOR.
const SOR_DEFAULTS: [(u32, u32); 4] = [
    (0x61C00C, 0x03010700),
    (0x61C010, 0x0000152F),
    (0x61C014, 0x00000000),
    (0x61C018, 0x00245AF8),
];

/// Methods sent once the core channel is up.
const INIT_METHODS: [u32; 6] = [
    mthd::INIT_084,
    mthd::INIT_088,
    mthd::HEAD_FB_ENABLE,
    mthd::HEAD_800,
    mthd::HEAD_810,
    mthd::HEAD_82C,
];


fn engine_budget(cfg: &DisplayConfig) -> PollBudget {
    PollBudget::new(cfg.timeouts.engine_us, cfg.timeouts.poll_interval_us)
}

pub struct Display<R: RegisterAccess> {
    regs: R,
    cfg: DisplayConfig,
    crtcs: [Crtc; 2],
    outputs: Vec<Output>,
    ports: PortMap,
}

impl<R: RegisterAccess> Display<R> {
    pub fn new(regs: R, cfg: DisplayConfig) -> Self {
        Self {
            regs,
            cfg,
            crtcs: [Crtc::new(Head::Head0), Crtc::new(Head::Head1)],
            outputs: Vec::new(),
            ports: PortMap::empty(),
        }
    }

    pub fn into_locked(self) -> LockedDisplay<R> {
        spin::Mutex::new(self)
    }

    pub fn config(&self) -> &DisplayConfig {
        &self.cfg
    }

    pub fn regs(&self) -> &R {
        &self.regs
    }

    pub fn regs_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    pub fn crtc(&self, head: Head) -> &Crtc {
        &self.crtcs[head.index() as usize]
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn output(&self, index: usize) -> DispResult<&Output> {
        self.outputs.get(index).ok_or(DispError::NoSuchOutput)
    }

    pub fn port_map(&self) -> &PortMap {
        &self.ports
    }

    fn check_output(&self, index: usize) -> DispResult<()> {
        self.output(index).map(|_| ())
    }

    // =========================================================================
    // Bring-up / teardown
    // =========================================================================

    /// Preserve the firmware's transmitter state in the shadow registers and
    /// arm transmitter defaults. Runs before any method is sent.
    pub fn pre_init(&mut self) {
        for &(shadow, live) in SHADOW_COPIES.iter() {
            let value = self.regs.read32(live);
            self.regs.write32(shadow, value);
        }
        for sor in 0..NUM_SORS {
            for &(offset, value) in SOR_DEFAULTS.iter() {
                self.regs.write32(offset + regs::SOR_STRIDE * sor, value);
            }
        }
        for dac in 0..NUM_DACS {
            let off = regs::DAC_STRIDE * dac;
            self.regs.write32(regs::DAC_CTRL + off, regs::DAC_CTRL_NORMAL);
            self.regs.write32(regs::DAC_TEST + off, 1);
        }
        log::debug!("g80: shadow registers primed");
    }

    /// Take the display engine from VGA and bring the core channel up.
    pub fn init(&mut self) -> DispResult<()> {
        if self.regs.read32(regs::DISP_SUPERVISOR) & SupervisorStatus::VGA_OWNED != 0 {
            log::info!("g80: releasing VGA ownership");
            self.regs.write32(regs::DISP_SUPERVISOR, SupervisorStatus::VGA_OWNED);
            self.regs.modify32(regs::VGA_CTRL, regs::VGA_CTRL_ENABLE, 0);
            poll::wait_clear(
                &mut self.regs,
                regs::VGA_CTRL,
                regs::VGA_CTRL_BUSY,
                engine_budget(&self.cfg),
                WaitSite::VgaRelease,
            )?;
        }

        self.regs.write32(regs::DISP_ENGINE_CTRL, regs::ENGINE_RESET);
        poll::wait_clear(
            &mut self.regs,
            regs::DISP_ENGINE_CTRL,
            regs::ENGINE_STATE_MASK,
            engine_budget(&self.cfg),
            WaitSite::EngineIdle,
        )?;
        self.regs.write32(regs::DISP_CMD_CTRL, regs::CMD_CTRL_ENABLE);
        self.regs.write32(regs::DISP_ENGINE_CTRL, regs::ENGINE_ENABLE);
        poll::wait_set(
            &mut self.regs,
            regs::DISP_ENGINE_CTRL,
            regs::ENGINE_READY,
            engine_budget(&self.cfg),
            WaitSite::EngineReady,
        )?;

        for &addr in INIT_METHODS.iter() {
            self.command(addr, 0)?;
        }
        log::info!("g80: core channel up");
        Ok(())
    }

    /// Blank every head, wait for enabled heads to acknowledge the disable,
    /// then stop the core channel and the engine.
    pub fn shutdown(&mut self) -> DispResult<()> {
        for head in Head::ALL {
            let list = self.crtcs[head.index() as usize].blank(true, &self.cfg);
            self.execute(list)?;
            self.crtcs[head.index() as usize].mark_blanked();
        }
        self.command(mthd::UPDATE, 0)?;

        for head in Head::ALL {
            if !self.crtcs[head.index() as usize].is_enabled() {
                continue;
            }
            let mask = SupervisorStatus::head_disable(head);
            self.regs.write32(regs::DISP_SUPERVISOR, mask);
            poll::wait_set(
                &mut self.regs,
                regs::DISP_SUPERVISOR,
                mask,
                engine_budget(&self.cfg),
                WaitSite::HeadDisable,
            )?;
            self.crtcs[head.index() as usize].disable();
        }

        self.regs.write32(regs::DISP_ENGINE_CTRL, 0);
        self.regs.write32(regs::DISP_CMD_CTRL, 0);
        poll::wait_clear(
            &mut self.regs,
            regs::DISP_ENGINE_CTRL,
            regs::ENGINE_STATE_MASK,
            engine_budget(&self.cfg),
            WaitSite::EngineIdle,
        )?;
        log::info!("g80: display engine stopped");
        Ok(())
    }

    /// Build the output list from the firmware routing table.
    ///
    /// A malformed table leaves the context with no outputs; the error is
    /// returned so the host can report it, but the context stays usable.
    pub fn create_outputs(&mut self, rom: &[u8]) -> DispResult<usize> {
        self.outputs.clear();
        let (map, result) = match PortMap::parse(rom) {
            Ok(map) => (map, Ok(())),
            Err(e) => {
                log::warn!("g80: couldn't find the DDC routing table: {}", e);
                (PortMap::empty(), Err(DispError::Table(e)))
            }
        };
        map.log_summary();

        for (port, route) in map.iter() {
            if let Some(or) = route.dac {
                self.outputs.push(Output::dac(or, port));
            }
            match route.sor {
                Some((or, PanelType::Tmds)) => self.outputs.push(Output::tmds(or, port)),
                Some((or, PanelType::Lvds)) => {
                    let native = sor::read_native_mode(&mut self.regs);
                    self.outputs.push(Output::lvds(or, port, native));
                }
                None => {}
            }
        }
        self.ports = map;
        result.map(|_| self.outputs.len())
    }

    // =========================================================================
    // Core channel
    // =========================================================================

    /// Send one method and service supervisor events until it retires.
    pub fn command(&mut self, addr: u32, data: u32) -> DispResult<()> {
        let handle = CoreChannel::submit(&mut self.regs, Method { addr, data });
        let mut budget = PollBudget::new(self.cfg.timeouts.command_us, self.cfg.timeouts.poll_interval_us);
        let mut failure = None;

        loop {
            match handle.poll(&mut self.regs) {
                CommandPoll::Done => break,
                CommandPoll::Pending => {}
                CommandPoll::Supervisor(event) => {
                    if let Err(e) = self.service_supervisor(event) {
                        failure = Some(e);
                    }
                    handle.acknowledge(&mut self.regs, event);
                }
            }
            if !budget.tick(&mut self.regs) {
                log::error!("g80: method {:#05x} = {:#010x} never retired", addr, data);
                return Err(DispError::Timeout(WaitSite::CoreChannel));
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Class 2 asks for the pixel clock of the flagged heads. Other classes
    /// only need the acknowledge.
    fn service_supervisor(&mut self, event: SupervisorEvent) -> DispResult<()> {
        if !event.needs_clock_update() {
            return Ok(());
        }
        let mut result = Ok(());
        for head in Head::ALL {
            if event.heads.contains(head.mask()) {
                if let Err(e) = self.set_pclk(head) {
                    result = Err(e);
                }
            }
        }
        result
    }

    fn set_pclk(&mut self, head: Head) -> DispResult<()> {
        let crtc = &self.crtcs[head.index() as usize];
        crtc.program_pclk(&mut self.regs)?;
        let pclk = crtc.pclk();
        for output in self.outputs.iter().filter(|o| o.head() == Some(head)) {
            output.set_clock_limit(&mut self.regs, pclk);
        }
        Ok(())
    }

    /// Run a configuration sequence in order.
    pub fn execute(&mut self, list: MethodList) -> DispResult<()> {
        for step in list {
            match step {
                Step::Method(m) => self.command(m.addr, m.data)?,
                Step::Mmio { offset, value } => self.regs.write32(offset, value),
            }
        }
        Ok(())
    }

    // =========================================================================
    // Mode setting
    // =========================================================================

    pub fn mode_valid(&self, index: usize, mode: &DisplayMode) -> DispResult<ModeStatus> {
        Ok(self.output(index)?.mode_valid(mode))
    }

    /// Route an output to a head. Takes effect with the next mode set.
    pub fn enable_output(&mut self, index: usize, head: Head) -> DispResult<()> {
        self.check_output(index)?;
        log::debug!("g80: {} -> HEAD{}", self.outputs[index].name(), head.index());
        self.outputs[index].bind(Some(head));
        Ok(())
    }

    /// Disconnect an output now. A head left driving nothing is blanked.
    pub fn disable_output(&mut self, index: usize) -> DispResult<()> {
        self.check_output(index)?;
        let head = self.outputs[index].head();
        self.outputs[index].bind(None);
        let list = self.outputs[index].mode_set(&mut self.regs, None, &self.cfg)?;
        self.execute(list)?;

        if let Some(head) = head {
            if !self.outputs.iter().any(|o| o.head() == Some(head)) {
                self.head_disable(head)?;
            }
        }
        self.command(mthd::UPDATE, 0)
    }

    /// Program `head` for `mode` and every output bound to it, or turn the
    /// head and its outputs off for `None`.
    pub fn mode_set(&mut self, head: Head, mode: Option<&DisplayMode>, x: u32, y: u32) -> DispResult<()> {
        let Some(mode) = mode else {
            return self.head_off(head);
        };

        let bound: Vec<usize> = (0..self.outputs.len())
            .filter(|&i| self.outputs[i].head() == Some(head))
            .collect();
        if bound.is_empty() {
            return Err(DispError::NotBound);
        }

        for &i in &bound {
            let status = self.outputs[i].mode_valid(mode);
            if status != ModeStatus::Ok {
                log::warn!("g80: {} rejects {}: {}", self.outputs[i].name(), mode.name, status);
                return Err(DispError::ModeRejected(status));
            }
        }

        let mut adjusted = mode.clone();
        let fixed = bound.iter().any(|&i| self.outputs[i].mode_fixup(&mut adjusted));
        if !fixed {
            self.crtcs[head.index() as usize].mode_fixup(&mut adjusted);
        }

        if PllParams::solve(adjusted.clock).is_zero() {
            log::warn!("g80: HEAD{}: no PLL setting for {} kHz", head.index(), adjusted.clock);
            return Err(DispError::ModeRejected(ModeStatus::NoClock));
        }

        self.prepare()?;

        let result = self
            .program_head(head, &adjusted, x, y, &bound)
            .and_then(|_| self.commit());
        if let Err(e) = result {
            log::error!("g80: mode set on HEAD{} failed: {}", head.index(), e);
            self.crtcs[head.index() as usize].disable();
            return Err(e);
        }
        Ok(())
    }

    /// Head timings, unblank, then the bound outputs. The head state follows
    /// each phase only once its methods have retired.
    fn program_head(
        &mut self,
        head: Head,
        mode: &DisplayMode,
        x: u32,
        y: u32,
        bound: &[usize],
    ) -> DispResult<()> {
        let idx = head.index() as usize;
        self.crtcs[idx].configure(mode.clock);
        let list = self.crtcs[idx].mode_set(mode, x, y, &self.cfg);
        self.execute(list)?;
        self.crtcs[idx].mark_blanked();

        let list = self.crtcs[idx].blank(false, &self.cfg);
        self.execute(list)?;
        self.crtcs[idx].mark_active();

        for &i in bound {
            let list = self.outputs[i].mode_set(&mut self.regs, Some(mode), &self.cfg)?;
            self.execute(list)?;
        }
        Ok(())
    }

    /// Send the off state to every output without a head.
    fn prepare(&mut self) -> DispResult<()> {
        for i in 0..self.outputs.len() {
            match self.outputs[i].head() {
                Some(head) => log::debug!("g80: {} -> HEAD{}", self.outputs[i].name(), head.index()),
                None => {
                    log::debug!("g80: {} disconnected", self.outputs[i].name());
                    let list = self.outputs[i].mode_set(&mut self.regs, None, &self.cfg)?;
                    self.execute(list)?;
                }
            }
        }
        Ok(())
    }

    /// Blank heads nothing is routed to, then latch everything.
    fn commit(&mut self) -> DispResult<()> {
        for head in Head::ALL {
            if self.outputs.iter().any(|o| o.head() == Some(head)) {
                continue;
            }
            self.head_disable(head)?;
        }
        self.command(mthd::UPDATE, 0)
    }

    /// Blank a head nothing drives any more and mark it disabled.
    fn head_disable(&mut self, head: Head) -> DispResult<()> {
        let idx = head.index() as usize;
        let list = self.crtcs[idx].blank(true, &self.cfg);
        self.crtcs[idx].disable();
        self.execute(list)
    }

    fn head_off(&mut self, head: Head) -> DispResult<()> {
        for i in 0..self.outputs.len() {
            if self.outputs[i].head() != Some(head) {
                continue;
            }
            self.outputs[i].bind(None);
            let list = self.outputs[i].mode_set(&mut self.regs, None, &self.cfg)?;
            self.execute(list)?;
        }
        self.head_disable(head)?;
        self.command(mthd::UPDATE, 0)
    }

    pub fn set_origin(&mut self, head: Head, x: u32, y: u32) -> DispResult<()> {
        let list = self.crtc(head).set_origin(x, y);
        self.execute(list)
    }

    pub fn blank(&mut self, head: Head, blank: bool) -> DispResult<()> {
        let idx = head.index() as usize;
        let list = self.crtcs[idx].blank(blank, &self.cfg);
        self.execute(list)?;
        if blank {
            self.crtcs[idx].mark_blanked();
        } else {
            self.crtcs[idx].mark_active();
        }
        self.command(mthd::UPDATE, 0)
    }

    /// Power an output up or down. The head it is bound to follows.
    pub fn set_dpms(&mut self, index: usize, mode: DpmsMode) -> DispResult<()> {
        self.check_output(index)?;
        if let Some(head) = self.outputs[index].head() {
            self.crtcs[head.index() as usize].dpms(mode == DpmsMode::On);
        }
        self.outputs[index].set_dpms(&mut self.regs, mode, &self.cfg)
    }

    // =========================================================================
    // Detection
    // =========================================================================

    /// Connection status of one output.
    ///
    /// A DAC is load-detected directly. A TMDS link answers from the cache
    /// filled by partner detection of its port. The internal panel is always
    /// there.
    pub fn detect(&mut self, index: usize) -> DispResult<ConnectionStatus> {
        self.check_output(index)?;
        let (kind, or, port) = {
            let o = &self.outputs[index];
            (o.kind(), o.or(), o.port())
        };
        match kind {
            OutputKind::Dac => {
                let status = if dac::load_detect(&mut self.regs, or, &self.cfg)? {
                    ConnectionStatus::Connected
                } else {
                    ConnectionStatus::Disconnected
                };
                self.outputs[index].set_status(status);
                if status == ConnectionStatus::Disconnected {
                    self.outputs[index].set_edid(None);
                }
                Ok(status)
            }
            OutputKind::Sor(PanelType::Tmds) => {
                if self.outputs[index].cached_status() == ConnectionStatus::Unknown {
                    self.detect_partners(port)?;
                }
                Ok(self.outputs[index].cached_status())
            }
            OutputKind::Sor(PanelType::Lvds) => Ok(ConnectionStatus::Connected),
        }
    }

    /// Invalidate every cached detection result.
    pub fn reset_detection(&mut self) {
        for output in self.outputs.iter_mut() {
            output.invalidate();
        }
    }

    fn read_ddc(&mut self, port: u32) -> DispResult<Edid> {
        let block = I2cBus::new(port, self.cfg.i2c).read_edid(&mut self.regs)?;
        let edid = Edid::parse(&block)?;
        log::info!(
            "g80: i2c{}: {}{}{} {:04x} {}",
            port,
            edid.manufacturer[0],
            edid.manufacturer[1],
            edid.manufacturer[2],
            edid.product_code,
            edid.name.as_deref().unwrap_or("")
        );
        Ok(edid)
    }

    /// EDID of the monitor on `port`, if one answers. A silent bus is the
    /// normal case for an empty connector.
    fn probe_ddc(&mut self, port: u32) -> Option<Edid> {
        match self.read_ddc(port) {
            Ok(edid) => Some(edid),
            Err(e @ DispError::Edid(_)) => {
                log::warn!("g80: i2c{}: {}", port, e);
                None
            }
            Err(e) => {
                log::debug!("g80: i2c{}: {}", port, e);
                None
            }
        }
    }

    /// Decide which transmitter of a port has the monitor: a DAC seeing load
    /// owns it, otherwise a digital link answering DDC does.
    fn detect_partners(&mut self, port: u32) -> DispResult<()> {
        let edid = self.probe_ddc(port);
        let dac = self
            .outputs
            .iter()
            .position(|o| o.port() == port && o.kind() == OutputKind::Dac);
        let tmds = self
            .outputs
            .iter()
            .position(|o| o.port() == port && o.kind() == OutputKind::Sor(PanelType::Tmds));

        let load = match dac {
            Some(i) => dac::load_detect(&mut self.regs, self.outputs[i].or(), &self.cfg)?,
            None => false,
        };

        if let Some(i) = dac {
            if load {
                self.outputs[i].set_detected(ConnectionStatus::Connected, edid.clone());
            } else {
                self.outputs[i].set_detected(ConnectionStatus::Disconnected, None);
            }
        }
        if let Some(i) = tmds {
            if edid.is_some() && !load {
                self.outputs[i].set_detected(ConnectionStatus::Connected, edid);
            } else {
                self.outputs[i].set_detected(ConnectionStatus::Disconnected, None);
            }
        }
        Ok(())
    }

    /// Modes an output can offer, probing the port if nothing is cached.
    pub fn get_modes(&mut self, index: usize) -> DispResult<Vec<DisplayMode>> {
        self.check_output(index)?;
        if self.outputs[index].is_panel() {
            return Ok(self.outputs[index].modes());
        }

        let port = self.outputs[index].port();
        match self.outputs[index].cached_status() {
            ConnectionStatus::Unknown => self.detect_partners(port)?,
            ConnectionStatus::Connected if self.outputs[index].edid().is_none() => {
                let edid = self.probe_ddc(port);
                self.outputs[index].set_edid(edid);
            }
            _ => {}
        }
        Ok(self.outputs[index].modes())
    }

    // =========================================================================
    // Cursor / dither
    // =========================================================================

    pub fn show_cursor(&mut self, head: Head, update: bool) -> DispResult<()> {
        let list = self.crtc(head).show_cursor(update);
        self.execute(list)
    }

    pub fn hide_cursor(&mut self, head: Head, update: bool) -> DispResult<()> {
        let list = self.crtc(head).hide_cursor(update);
        self.execute(list)
    }

    pub fn set_cursor_position(&mut self, head: Head, x: i32, y: i32) -> DispResult<()> {
        let list = self.crtc(head).set_cursor_position(x, y);
        self.execute(list)
    }

    pub fn set_dither(&mut self, head: Head, enable: bool, update: bool) -> DispResult<()> {
        let list = self.crtc(head).set_dither(enable, update);
        self.execute(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crtc::CrtcState;
    use crate::mode::ModeFlags;
    use crate::routing::tests::{entry, rom_with};
    use crate::regs::armed;
    use crate::testutil::{capture_logs, sample_edid, FakeRegs};
    use alloc::vec;

    const DAC0_CTRL: u32 = 0x61A004;
    const DAC0_LOAD: u32 = 0x61A00C;

    fn display(entries: &[u32]) -> Display<FakeRegs> {
        let mut regs = FakeRegs::idle();
        regs.set_sticky(DAC0_CTRL, 0);
        regs.set_sticky(DAC0_CTRL + 0x800, 0);
        let mut d = Display::new(regs, DisplayConfig::default());
        d.create_outputs(&rom_with(entries)).unwrap();
        d
    }

    fn mode_1080p() -> DisplayMode {
        DisplayMode::from_timings(
            148_500,
            (1920, 2008, 2052, 2200),
            (1080, 1084, 1089, 1125),
            ModeFlags::PHSYNC | ModeFlags::PVSYNC,
        )
    }

    #[test]
    fn test_pre_init_copies_shadow_state() {
        let mut regs = FakeRegs::new();
        regs.set(0x614004, 0x1234);
        regs.set(0x61C800, 0x5678);
        let mut d = Display::new(regs, DisplayConfig::default());
        d.pre_init();
        let regs = d.regs();
        assert_eq!(regs.value(0x610184), 0x1234);
        assert_eq!(regs.value(0x6101E4), 0x5678);
        assert_eq!(regs.value(0x61C00C), 0x03010700);
        assert_eq!(regs.value(0x61C818), 0x00245AF8);
        assert_eq!(regs.writes_to(0x61B004), [0x80550000]);
        assert_eq!(regs.writes_to(0x61A810), [1]);
    }

    #[test]
    fn test_init_releases_vga_and_starts_channel() {
        let mut regs = FakeRegs::idle();
        regs.set(regs::DISP_SUPERVISOR, SupervisorStatus::VGA_OWNED);
        regs.set(regs::VGA_CTRL, 0x1);
        let mut d = Display::new(regs, DisplayConfig::default());
        d.init().unwrap();

        let regs = d.regs();
        assert_eq!(regs.writes_to(regs::DISP_SUPERVISOR), [0x100]);
        assert_eq!(regs.writes_to(regs::VGA_CTRL), [0]);
        assert_eq!(regs.writes_to(regs::DISP_ENGINE_CTRL), [0x2b00, 0x1000b03]);
        assert_eq!(regs.writes_to(regs::DISP_CMD_CTRL)[0], 1);
        assert_eq!(
            regs.methods(),
            [(0x84, 0), (0x88, 0), (0x874, 0), (0x800, 0), (0x810, 0), (0x82C, 0)]
        );
    }

    #[test]
    fn test_init_engine_never_ready() {
        let mut regs = FakeRegs::new();
        regs.set_sticky(regs::DISP_ENGINE_CTRL, 0);
        let mut cfg = DisplayConfig::default();
        cfg.timeouts.engine_us = 50;
        let mut d = Display::new(regs, cfg);
        assert_eq!(d.init(), Err(DispError::Timeout(WaitSite::EngineReady)));
        assert!(d.regs().methods().is_empty());
    }

    #[test]
    fn test_command_times_out() {
        let mut regs = FakeRegs::new();
        regs.set_sticky(regs::DISP_CMD_CTRL, 0x8001_0081);
        let mut cfg = DisplayConfig::default();
        cfg.timeouts.command_us = 10;
        let mut d = Display::new(regs, cfg);
        assert_eq!(d.command(0x80, 0), Err(DispError::Timeout(WaitSite::CoreChannel)));
        assert_eq!(d.regs().delays.iter().sum::<u32>(), 10);
    }

    #[test]
    fn test_create_outputs_from_table() {
        let d = display(&[entry(0, 0, 0), entry(2, 0, 0), entry(0, 1, 1)]);
        let names: Vec<&str> = d.outputs().iter().map(|o| o.name()).collect();
        assert_eq!(names, ["VGA0", "DVI0", "VGA1"]);
        assert_eq!(d.outputs()[1].port(), 0);
        assert_eq!(d.outputs()[2].port(), 1);
    }

    #[test]
    fn test_bad_table_leaves_no_outputs() {
        let mut rom = rom_with(&[entry(0, 0, 0)]);
        rom[0] = 0;
        let mut d = Display::new(FakeRegs::idle(), DisplayConfig::default());
        assert_eq!(
            d.create_outputs(&rom),
            Err(DispError::Table(crate::routing::TableError::BadSignature))
        );
        assert!(d.outputs().is_empty());
        assert!(d.port_map().is_empty());
    }

    #[test]
    fn test_mode_set_sequence() {
        let mut d = display(&[entry(0, 0, 0), entry(2, 0, 0)]);
        d.enable_output(0, Head::Head0).unwrap();
        d.mode_set(Head::Head0, Some(&mode_1080p()), 0, 0).unwrap();

        let methods = d.regs().methods();
        // unbound DVI0 goes off first
        assert_eq!(methods[0], (0x600, 0));
        assert_eq!(methods[1], (0x804, 148_500 | 0x800000));
        assert!(methods.contains(&(0x814, 0x04650898)));

        let dac = methods.iter().position(|&m| m == (0x400, 0x41)).unwrap();
        assert_eq!(methods[dac + 1], (0x404, 0));
        // head 1 drives nothing and is blanked before the update
        assert_eq!(&methods[dac + 2..], &[(0xC40, 0), (0xC44, 0), (0xC74, 0), (0x80, 0)]);

        assert_eq!(d.crtc(Head::Head0).state(), CrtcState::Active);
        assert_eq!(d.crtc(Head::Head0).pclk(), 148_500);
        assert_eq!(d.crtc(Head::Head1).state(), CrtcState::Disabled);
    }

    #[test]
    fn test_supervisor_programs_clock_and_limits() {
        let mut d = display(&[entry(0, 0, 0), entry(2, 1, 1)]);
        d.enable_output(0, Head::Head0).unwrap();
        d.enable_output(1, Head::Head0).unwrap();
        d.mode_set(Head::Head0, Some(&mode_1080p()), 0, 0).unwrap();

        let regs = d.regs_mut();
        regs.writes.clear();
        regs.queue_reads(regs::DISP_CMD_CTRL, &[0x8001_0081, 0x8001_0081, 0]);
        regs.queue_reads(regs::DISP_SUPERVISOR, &[0x20, 0x00]);
        regs.queue_reads(regs::DISP_SUPERVISOR_HEADS, &[0x200]);
        d.command(0x80, 0).unwrap();

        let regs = d.regs();
        assert_eq!(regs.writes_to(0x614100), [0x10000610]);
        let params = crate::regs::PllCoeffs { lo: regs.value(0x614104), hi: regs.value(0x614108) }.unpack();
        assert_eq!(params, PllParams::solve(148_500));
        assert_eq!(regs.writes_to(0x614200), [0]);
        assert!(regs.writes_to(0x614900).is_empty());
        // DAC limit cleared, SOR1 dual link below 165 MHz is off
        assert_eq!(regs.writes_to(0x614280), [0]);
        assert_eq!(regs.writes_to(0x614B00), [0]);
        assert_eq!(regs.writes_to(regs::DISP_SUPERVISOR), [0x20]);
        assert_eq!(regs.writes_to(regs::DISP_SUPERVISOR_HEADS), [0x80000000]);
    }

    #[test]
    fn test_supervisor_refuses_infeasible_clock() {
        let mut d = display(&[entry(0, 0, 0)]);
        d.enable_output(0, Head::Head0).unwrap();
        d.crtcs[0].configure(10_000_000);

        let regs = d.regs_mut();
        regs.queue_reads(regs::DISP_CMD_CTRL, &[0x8001_0081, 0x8001_0081, 0]);
        regs.queue_reads(regs::DISP_SUPERVISOR, &[0x20, 0x00]);
        regs.queue_reads(regs::DISP_SUPERVISOR_HEADS, &[0x200]);
        assert_eq!(d.command(0x80, 0), Err(DispError::NoPllSolution { pclk: 10_000_000 }));

        let regs = d.regs();
        assert!(regs.writes_to(0x614100).is_empty());
        assert!(regs.writes_to(0x614104).is_empty());
        assert!(regs.writes_to(0x614280).is_empty());
        // the event is still retired
        assert_eq!(regs.writes_to(regs::DISP_SUPERVISOR), [0x20]);
        assert_eq!(regs.writes_to(regs::DISP_SUPERVISOR_HEADS), [0x80000000]);
    }

    #[test]
    fn test_other_supervisor_classes_only_acknowledged() {
        let mut d = display(&[entry(0, 0, 0)]);
        let regs = d.regs_mut();
        regs.queue_reads(regs::DISP_CMD_CTRL, &[0x8001_0081, 0]);
        regs.queue_reads(regs::DISP_SUPERVISOR, &[0x10]);
        d.command(0x80, 0).unwrap();
        let regs = d.regs();
        assert_eq!(regs.writes_to(regs::DISP_SUPERVISOR), [0x10]);
        assert!(regs.writes_to(0x614100).is_empty());
    }

    #[test]
    fn test_rejected_mode_writes_nothing() {
        let mut d = display(&[entry(2, 0, 0)]);
        d.enable_output(0, Head::Head1).unwrap();
        let mut mode = mode_1080p();
        mode.clock = 340_000;
        assert_eq!(
            d.mode_set(Head::Head1, Some(&mode), 0, 0),
            Err(DispError::ModeRejected(ModeStatus::ClockHigh))
        );
        assert!(d.regs().methods().is_empty());
        assert_eq!(d.mode_set(Head::Head0, Some(&mode_1080p()), 0, 0), Err(DispError::NotBound));
    }

    fn arm_panel(regs: &mut FakeRegs) {
        regs.set(regs::DISP_PANEL_STRAP, 0x1);
        regs.set(0x610AD4, 71_000 | 0x800000);
        regs.set(0x610B4C, (800 << 16) | 1280);
        regs.set(0x610AF4, (823 << 16) | 1440);
        regs.set(0x610B04, (5 << 16) | 31);
        regs.set(0x610AE8, (19 << 16) | 111);
        regs.set(0x610AFC, (819 << 16) | 1391);
    }

    #[test]
    fn test_panel_drives_native_timing() {
        let mut regs = FakeRegs::idle();
        arm_panel(&mut regs);
        let mut d = Display::new(regs, DisplayConfig::default());
        d.create_outputs(&rom_with(&[entry(3, 2, 0)])).unwrap();
        assert!(d.outputs()[0].native_mode().is_some());
        assert_eq!(d.detect(0), Ok(ConnectionStatus::Connected));

        let vga = DisplayMode::from_timings(25_175, (640, 656, 752, 800), (480, 490, 492, 525), ModeFlags::NHSYNC | ModeFlags::NVSYNC);
        d.enable_output(0, Head::Head0).unwrap();
        d.mode_set(Head::Head0, Some(&vga), 0, 0).unwrap();

        let methods = d.regs().methods();
        assert!(methods.contains(&(0x804, 71_000 | 0x800000)));
        assert!(methods.contains(&(0x814, (823 << 16) | 1440)));
        assert!(methods.contains(&(0x8C8, (800 << 16) | 1280)));
        // LVDS protocol, head 0, panel polarity
        assert!(methods.contains(&(0x600, 1)));
        assert_eq!(d.crtc(Head::Head0).pclk(), 71_000);

        assert_eq!(d.get_modes(0).map(|m| m.len()), Ok(1));
    }

    /// Arm head 0 the way the firmware leaves it after lighting `mode`.
    fn arm_head0(regs: &mut FakeRegs, mode: &DisplayMode) {
        let list = Crtc::new(Head::Head0).mode_set(mode, 0, 0, &DisplayConfig::default());
        let get = |addr| list.find(addr).unwrap_or(0);
        regs.set(regs::DISP_PANEL_STRAP, 0x1);
        regs.set(armed::CLOCK, get(0x804));
        regs.set(armed::TOTAL, get(0x814));
        regs.set(armed::SYNC_END, get(0x818));
        regs.set(armed::BLANK_END, get(0x81C));
        regs.set(armed::BLANK_START, get(0x820));
        regs.set(armed::SIZE, get(0x8D8));
    }

    #[test]
    fn test_fast_panel_drives_its_native_clock() {
        let wuxga = DisplayMode::from_timings(
            154_000,
            (1920, 1968, 2000, 2080),
            (1200, 1203, 1209, 1235),
            ModeFlags::empty(),
        );
        let mut regs = FakeRegs::idle();
        arm_head0(&mut regs, &wuxga);
        let mut d = Display::new(regs, DisplayConfig::default());
        d.create_outputs(&rom_with(&[entry(3, 2, 0)])).unwrap();

        let modes = d.get_modes(0).unwrap();
        assert_eq!(modes.len(), 1);
        assert_eq!(modes[0].clock, 154_000);
        assert_eq!(d.mode_valid(0, &modes[0]), Ok(ModeStatus::Ok));

        d.enable_output(0, Head::Head0).unwrap();
        d.mode_set(Head::Head0, Some(&modes[0]), 0, 0).unwrap();
        let methods = d.regs().methods();
        assert!(methods.contains(&(0x804, 154_000 | 0x800000)));
        // panels stay single link
        assert!(methods.contains(&(0x600, 1)));

        let regs = d.regs_mut();
        regs.writes.clear();
        regs.queue_reads(regs::DISP_CMD_CTRL, &[0x8001_0081, 0x8001_0081, 0]);
        regs.queue_reads(regs::DISP_SUPERVISOR, &[0x20, 0x00]);
        regs.queue_reads(regs::DISP_SUPERVISOR_HEADS, &[0x200]);
        d.command(0x80, 0).unwrap();
        assert_eq!(d.regs().writes_to(0x614300), [0x101]);
    }

    #[test]
    fn test_unblank_of_unconfigured_head_keeps_it_disabled() {
        let mut d = display(&[entry(0, 0, 0)]);
        d.blank(Head::Head1, false).unwrap();
        assert_eq!(d.crtc(Head::Head1).state(), CrtcState::Disabled);

        d.regs_mut().writes.clear();
        d.shutdown().unwrap();
        assert!(d.regs().writes_to(regs::DISP_SUPERVISOR).is_empty());
    }

    #[test]
    fn test_blank_and_unblank_configured_head() {
        let mut d = display(&[entry(0, 0, 0)]);
        d.enable_output(0, Head::Head0).unwrap();
        d.mode_set(Head::Head0, Some(&mode_1080p()), 0, 0).unwrap();
        d.blank(Head::Head0, true).unwrap();
        assert_eq!(d.crtc(Head::Head0).state(), CrtcState::Blanked);
        d.blank(Head::Head0, false).unwrap();
        assert_eq!(d.crtc(Head::Head0).state(), CrtcState::Active);
    }

    #[test]
    fn test_failed_mode_set_leaves_head_disabled() {
        let mut d = display(&[entry(0, 0, 0)]);
        d.enable_output(0, Head::Head0).unwrap();
        d.cfg.timeouts.command_us = 50;
        d.regs_mut().set_sticky(regs::DISP_CMD_CTRL, 0x8001_0081);

        let mut mode = mode_1080p();
        mode.clock = 65_000;
        assert_eq!(
            d.mode_set(Head::Head0, Some(&mode), 0, 0),
            Err(DispError::Timeout(WaitSite::CoreChannel))
        );
        assert_eq!(d.crtc(Head::Head0).state(), CrtcState::Disabled);
        assert_eq!(d.crtc(Head::Head0).pclk(), 0);
    }

    #[test]
    fn test_missing_transmitters_create_no_outputs() {
        let d = display(&[entry(0, 0, 3), entry(2, 1, 3), entry(0, 2, 1)]);
        let names: Vec<&str> = d.outputs().iter().map(|o| o.name()).collect();
        assert_eq!(names, ["VGA1"]);
    }

    #[test]
    fn test_dac_disconnect_drops_stale_edid() {
        let mut d = display(&[entry(0, 0, 0), entry(2, 0, 0)]);
        d.regs_mut().attach_ddc(0, sample_edid());
        d.regs_mut().queue_reads(DAC0_LOAD, &[0x38000000]);
        assert_eq!(d.get_modes(0).map(|m| m.len()), Ok(1));

        d.regs_mut().queue_reads(DAC0_LOAD, &[0x30000000]);
        assert_eq!(d.detect(0), Ok(ConnectionStatus::Disconnected));
        assert!(d.outputs()[0].edid().is_none());
        assert_eq!(d.get_modes(0), Ok(vec![]));
    }

    #[test]
    fn test_ddc_errors() {
        let mut d = display(&[entry(2, 0, 0), entry(2, 1, 1)]);
        assert!(matches!(d.read_ddc(1), Err(DispError::I2c(_))));

        let mut edid = sample_edid();
        edid[127] ^= 1;
        d.regs_mut().attach_ddc(0, edid);
        assert!(matches!(d.read_ddc(0), Err(DispError::Edid(_))));
        assert_eq!(d.detect(0), Ok(ConnectionStatus::Disconnected));
    }

    #[test]
    fn test_output_dpms_reaches_its_head() {
        let logs = capture_logs();
        let mut d = display(&[entry(0, 0, 0)]);
        d.enable_output(0, Head::Head1).unwrap();
        d.set_dpms(0, DpmsMode::Off).unwrap();
        assert!(logs.contains("crtc1: dpms off ignored"));
        assert!(!d.regs().writes_to(0x61A004).is_empty());
    }

    #[test]
    fn test_dac_load_detect() {
        let mut d = display(&[entry(0, 0, 0)]);
        d.regs_mut().queue_reads(DAC0_LOAD, &[0x38000000]);
        assert_eq!(d.detect(0), Ok(ConnectionStatus::Connected));
        d.regs_mut().queue_reads(DAC0_LOAD, &[0x30000000]);
        assert_eq!(d.detect(0), Ok(ConnectionStatus::Disconnected));
        assert_eq!(d.outputs()[0].cached_status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_tmds_detect_is_cached() {
        let mut d = display(&[entry(2, 0, 0)]);
        d.regs_mut().attach_ddc(0, sample_edid());
        assert_eq!(d.detect(0), Ok(ConnectionStatus::Connected));
        assert_eq!(d.outputs()[0].edid().and_then(|e| e.name.as_deref()), Some("G80 TEST"));

        let probes = d.regs().ddc.as_ref().map(|(_, s)| s.transfers);
        assert_eq!(d.detect(0), Ok(ConnectionStatus::Connected));
        assert_eq!(d.regs().ddc.as_ref().map(|(_, s)| s.transfers), probes);

        d.reset_detection();
        assert_eq!(d.outputs()[0].cached_status(), ConnectionStatus::Unknown);
        assert_eq!(d.detect(0), Ok(ConnectionStatus::Connected));
        assert!(d.regs().ddc.as_ref().map(|(_, s)| s.transfers) > probes);
    }

    #[test]
    fn test_tmds_without_monitor() {
        let mut d = display(&[entry(2, 1, 0)]);
        assert_eq!(d.detect(0), Ok(ConnectionStatus::Disconnected));
        assert_eq!(d.get_modes(0), Ok(vec![]));
    }

    #[test]
    fn test_dvi_i_analog_monitor_goes_to_dac() {
        let mut d = display(&[entry(0, 0, 0), entry(2, 0, 0)]);
        d.regs_mut().attach_ddc(0, sample_edid());
        d.regs_mut().queue_reads(DAC0_LOAD, &[0x38000000]);

        assert_eq!(d.detect(1), Ok(ConnectionStatus::Disconnected));
        assert_eq!(d.outputs()[0].cached_status(), ConnectionStatus::Connected);
        assert!(d.outputs()[0].edid().is_some());
        assert!(d.outputs()[1].edid().is_none());

        let modes = d.get_modes(0).unwrap();
        assert_eq!(modes.len(), 1);
        assert_eq!((modes[0].hdisplay, modes[0].vdisplay), (1920, 1080));
    }

    #[test]
    fn test_dvi_i_digital_monitor_goes_to_sor() {
        let mut d = display(&[entry(0, 0, 0), entry(2, 0, 0)]);
        d.regs_mut().attach_ddc(0, sample_edid());
        d.regs_mut().queue_reads(DAC0_LOAD, &[0]);

        assert_eq!(d.get_modes(1).map(|m| m.len()), Ok(1));
        assert_eq!(d.outputs()[1].cached_status(), ConnectionStatus::Connected);
        assert_eq!(d.outputs()[0].cached_status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_disable_output_blanks_orphaned_head() {
        let mut d = display(&[entry(0, 0, 0)]);
        d.enable_output(0, Head::Head1).unwrap();
        d.mode_set(Head::Head1, Some(&mode_1080p()), 0, 0).unwrap();
        d.regs_mut().writes.clear();

        d.disable_output(0).unwrap();
        assert_eq!(d.outputs()[0].head(), None);
        assert_eq!(
            d.regs().methods(),
            [(0x400, 0), (0xC40, 0), (0xC44, 0), (0xC74, 0), (0x80, 0)]
        );
        assert_eq!(d.crtc(Head::Head1).state(), CrtcState::Disabled);
    }

    #[test]
    fn test_null_mode_turns_head_off() {
        let mut d = display(&[entry(0, 0, 0)]);
        d.enable_output(0, Head::Head0).unwrap();
        d.mode_set(Head::Head0, Some(&mode_1080p()), 0, 0).unwrap();
        d.mode_set(Head::Head0, None, 0, 0).unwrap();
        assert_eq!(d.crtc(Head::Head0).state(), CrtcState::Disabled);
        assert_eq!(d.outputs()[0].head(), None);
    }

    #[test]
    fn test_shutdown_waits_for_enabled_heads() {
        let mut d = display(&[entry(0, 0, 0)]);
        d.enable_output(0, Head::Head0).unwrap();
        d.mode_set(Head::Head0, Some(&mode_1080p()), 0, 0).unwrap();
        d.regs_mut().writes.clear();

        d.shutdown().unwrap();
        let regs = d.regs();
        assert_eq!(regs.writes_to(regs::DISP_SUPERVISOR), [0x4]);
        let tail = &regs.writes[regs.writes.len() - 2..];
        assert_eq!(tail, &[(regs::DISP_ENGINE_CTRL, 0), (regs::DISP_CMD_CTRL, 0)]);
        assert_eq!(
            regs.methods(),
            [(0x840, 0), (0x844, 0), (0x874, 0), (0xC40, 0), (0xC44, 0), (0xC74, 0), (0x80, 0)]
        );
        assert!(!d.crtc(Head::Head0).is_enabled());
    }

    #[test]
    fn test_cursor_and_origin_pass_through() {
        let mut d = display(&[]);
        d.set_origin(Head::Head1, 16, 32).unwrap();
        d.show_cursor(Head::Head0, false).unwrap();
        d.set_dither(Head::Head1, true, true).unwrap();
        d.set_cursor_position(Head::Head1, -4, 10).unwrap();
        assert_eq!(
            d.regs().methods(),
            [(0xCC0, (32 << 16) | 16), (0x80, 0), (0x880, 0x85000000), (0xCA0, 0x11), (0x80, 0)]
        );
        assert_eq!(d.regs().value(0x648084), (10 << 16) | 0xfffc);
    }

    #[test]
    fn test_unknown_output_index() {
        let mut d = display(&[entry(0, 0, 0)]);
        assert_eq!(d.detect(3), Err(DispError::NoSuchOutput));
        assert_eq!(d.enable_output(1, Head::Head0), Err(DispError::NoSuchOutput));
        assert_eq!(d.set_dpms(7, DpmsMode::Off), Err(DispError::NoSuchOutput));
    }

    #[test]
    fn test_locked_display() {
        let locked: LockedDisplay<FakeRegs> = Display::new(FakeRegs::idle(), DisplayConfig::default()).into_locked();
        locked.lock().init().unwrap();
        assert_eq!(locked.lock().regs().methods().len(), 6);
    }
}
