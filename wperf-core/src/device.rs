//! IOCTL Dispatcher (C6): the in-process stand-in for the WDF device
//! extension, routing each [`crate::wire::PmuCtlAction`] to the session
//! lock, scheduler, or sampling engine. Per spec.md §9 this is an
//! in-process call rather than a real `DeviceIoControl`, but every
//! operation still goes through the same admission (session lock) and
//! validation steps a real driver would apply at its dispatch routine.

use crate::coreinfo::PseudoEvent;
use crate::dmc::DmcArray;
use crate::error::{DeviceError, Result};
use crate::lock::{HandleId, SessionLock};
use crate::sampling::{handle_pmi, TrapFrame};
use crate::scheduler::{CoreSlot, Scheduler};
use crate::wire::{
    DmcReadOut, EvtClass, EvtClassEvents, FrameChain, HwCfg, LockFlag, PmuCtlAction, PmuEventUsr,
    ReadOut, StatusFlag, SuppEvents, VersionInfo, CORE_SUPP_EVENT_CODES, CYCLE_EVENT_IDX,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use wperf_raw::dmc::{MmioRegion, SimMmio, DMC_CLKDIV2_NUMGPC, DMC_CLK_NUMGPC};
use wperf_raw::spe::SPE_MEMORY_BUFFER_SIZE;
use wperf_raw::{Spe, SpeConfig, SystemRegister};

/// Driver's own `MAJOR.MINOR.PATCH`, returned unconditionally by
/// `QUERY_VERSION` regardless of what the caller sent
/// (`device.c::PMU_CTL_QUERY_VERSION`'s handler only logs a mismatch, it
/// never rejects the call for it).
pub const DRIVER_VERSION: (u8, u8, u8) = (3, 9, 0);

/// Per-core SPE state, separate from [`CoreSlot`] since SPE is
/// initialized independently of the PMU scheduling path (`SPE_INIT`
/// precedes `SPE_START`, spec.md §5). `data` stands in for the
/// kernel-allocated DMA sample buffer the real `spe_init` carves out of
/// `SpeMemoryBuffer`; here it is caller-process memory instead, since
/// nothing in this workspace plays the role of the kernel allocator.
struct SpeSlot<B: SystemRegister> {
    spe: Spe<B>,
    buffer_base: u64,
    buffer_limit: u64,
    data: Vec<u8>,
}

/// The device-object boundary: owns the session lock, the per-core
/// scheduler, per-core SPE units, and the DMC array. One `Device` is
/// created when the simulated "device" is opened and torn down when it
/// is closed.
pub struct Device<B: SystemRegister + 'static, M: MmioRegion + 'static = SimMmio> {
    pub lock: SessionLock,
    pub scheduler: Scheduler<B>,
    spe_slots: Vec<Arc<Mutex<Option<SpeSlot<B>>>>>,
    spe_watchdogs: Mutex<Vec<Option<JoinHandle<()>>>>,
    dmc: Mutex<Option<DmcArray<M>>>,
}

impl<B: SystemRegister + 'static, M: MmioRegion + 'static> Device<B, M> {
    pub fn new(slots: Vec<Arc<CoreSlot<B>>>, spe_backends: Vec<B>) -> Self {
        let n = spe_backends.len();
        let spe_slots = spe_backends
            .into_iter()
            .map(|_| Arc::new(Mutex::new(None)))
            .collect();
        Self {
            lock: SessionLock::new(),
            scheduler: Scheduler::new(slots),
            spe_slots,
            spe_watchdogs: Mutex::new((0..n).map(|_| None).collect()),
            dmc: Mutex::new(None),
        }
    }

    /// Install the DMC array (`DMC_INIT`): one descriptor per physical
    /// memory controller, each already mapped to its MMIO region by the
    /// caller (`device.c`'s `DmcChannelInit`, invoked once at device
    /// bring-up in the original rather than per-session here).
    pub fn dmc_init(&self, requester: HandleId, dmc: DmcArray<M>) -> Result<()> {
        self.require_admission(requester)?;
        *self.dmc.lock() = Some(dmc);
        Ok(())
    }

    /// `DMC_READ_COUNTING`: update every configured DMC's clk/clkdiv2
    /// counters and return the accumulated event lists for `dmc_idx`
    /// (`dpc.c::UpdateDmcCounting`, read back rather than polled on a
    /// timer since no DMC scheduling task exists in this crate).
    pub fn dmc_read_counting(&self, requester: HandleId, dmc_idx: u8) -> Result<DmcReadOut> {
        self.require_admission(requester)?;
        let mut guard = self.dmc.lock();
        let array = guard
            .as_mut()
            .ok_or_else(|| DeviceError::InvalidDeviceState("DMC not initialized".into()))?;
        let desc = array.get_mut(dmc_idx)?;
        desc.update_counting();
        Ok(DmcReadOut {
            clk_events: desc.clk_events.iter().map(to_pmu_event_usr).collect(),
            clkdiv2_events: desc.clkdiv2_events.iter().map(to_pmu_event_usr).collect(),
        })
    }

    /// `DSU_INIT`: establish the logical->physical DSU counter map for a
    /// core and assign its cluster event list
    /// (`device.c::evt_assign_dsu`).
    pub fn dsu_init(
        &self,
        requester: HandleId,
        core_idx: u32,
        events: Vec<PseudoEvent>,
        free_physical_mask: u32,
    ) -> Result<()> {
        self.require_admission(requester)?;
        self.scheduler.assign_dsu_events(core_idx, events, free_physical_mask)
    }

    /// `DSU_READ_COUNTING`: snapshot the cluster event list's accumulated
    /// values, mirroring [`Self::read_counting`] for the core PMU.
    pub fn dsu_read_counting(&self, requester: HandleId, core_idx: u32) -> Result<ReadOut> {
        self.require_admission(requester)?;
        let slot = self.scheduler.slot(core_idx)?;
        let info = slot.info.lock();
        Ok(ReadOut {
            round: info.timer_round,
            evts: info.dsu_events.iter().map(to_pmu_event_usr).collect(),
        })
    }

    /// `QUERY_HW_CFG`: static hardware configuration, read once from core
    /// 0's PMU and identification registers on the assumption of a
    /// homogeneous topology (`device.c::WindowsPerfDeviceCreate` reads
    /// these globally, once, at driver bring-up for the same reason).
    pub fn query_hw_cfg(&self, requester: HandleId) -> Result<HwCfg> {
        self.require_admission(requester)?;
        let slot = self.scheduler.slot(0)?;
        let pmu_ver = slot.pmu.pmu_version();
        if pmu_ver == 0 {
            return Err(DeviceError::InvalidDeviceState("PMU not present".into()));
        }
        let midr = slot.pmu.midr();
        let gpc_num = slot.pmu.gpc_count();
        let counter_idx_map = slot
            .counter_map
            .lock()
            .as_ref()
            .map(|m| m.to_wire_array())
            .unwrap_or([0xFFu8; 32]);

        Ok(HwCfg {
            pmu_ver,
            fpc_num: 1,
            gpc_num,
            total_gpc_num: gpc_num,
            vendor_id: ((midr >> 24) & 0xff) as u8,
            variant_id: ((midr >> 20) & 0xf) as u8,
            arch_id: ((midr >> 16) & 0xf) as u8,
            rev_id: (midr & 0xf) as u8,
            part_id: ((midr >> 4) & 0xfff) as u16,
            core_num: self.scheduler.core_count() as u16,
            midr_value: midr,
            id_aa64dfr0_value: slot.pmu.id_dfr0(),
            counter_idx_map,
            device_id_str: String::new(),
            pmbidr_el1_value: 0,
            pmsidr_el1_value: 0,
        })
    }

    /// `QUERY_SUPP_EVENTS`: the supplemented core event-code table always
    /// reported, plus the DMC clk/clkdiv2 classes once a DMC array has
    /// been installed. The DSU class is omitted: the original derives it
    /// from `dsu_evt_mask_lo`/`dsu_evt_mask_hi`, bitmasks set by hardware
    /// probing that has no counterpart surviving in this pack.
    pub fn query_supp_events(&self, requester: HandleId) -> Result<SuppEvents> {
        self.require_admission(requester)?;
        let mut classes = vec![EvtClassEvents {
            evt_class: EvtClass::Core,
            events: CORE_SUPP_EVENT_CODES.to_vec(),
        }];
        if self.dmc.lock().as_ref().is_some_and(|d| !d.is_empty()) {
            classes.push(EvtClassEvents {
                evt_class: EvtClass::DmcClk,
                events: (0..DMC_CLK_NUMGPC as u16).collect(),
            });
            classes.push(EvtClassEvents {
                evt_class: EvtClass::DmcClkdiv2,
                events: (0..DMC_CLKDIV2_NUMGPC as u16).collect(),
            });
        }
        Ok(SuppEvents { classes })
    }

    /// `QUERY_VERSION`: logs a mismatch if the caller's version differs
    /// but always returns the driver's own version
    /// (`device.c::PMU_CTL_QUERY_VERSION`).
    pub fn query_version(&self, requester: HandleId, caller: VersionInfo) -> Result<VersionInfo> {
        self.require_admission(requester)?;
        let (major, minor, patch) = DRIVER_VERSION;
        if (caller.major, caller.minor, caller.patch) != (major, minor, patch) {
            tracing::warn!(
                caller_version = format!("{}.{}.{}", caller.major, caller.minor, caller.patch),
                driver_version = format!("{major}.{minor}.{patch}"),
                "QUERY_VERSION: caller/driver version mismatch"
            );
        }
        Ok(VersionInfo {
            major,
            minor,
            patch,
            gitver: String::new(),
            featurestring: String::new(),
        })
    }

    fn require_admission(&self, requester: HandleId) -> Result<()> {
        if self.lock.admits(requester) {
            Ok(())
        } else {
            Err(DeviceError::InvalidDeviceState(
                "device is locked by another session".into(),
            ))
        }
    }

    // --- C2: Session Lock -------------------------------------------------

    pub fn lock_acquire(&self, requester: HandleId, force: bool) -> Result<StatusFlag> {
        let flag = if force { LockFlag::GetForce } else { LockFlag::Get };
        self.lock.handle(flag, requester)
    }

    pub fn lock_release(&self, requester: HandleId) -> Result<StatusFlag> {
        self.lock.handle(LockFlag::Release, requester)
    }

    // --- C3: Event Scheduler -----------------------------------------------

    /// `ASSIGN_EVENTS`: establish the counter index map for this session
    /// and program the core's event list (spec.md §4.2/§4.3).
    pub fn assign_events(
        &self,
        requester: HandleId,
        core_idx: u32,
        events: Vec<PseudoEvent>,
        free_physical_mask: u32,
    ) -> Result<()> {
        self.require_admission(requester)?;
        self.scheduler.assign_events(core_idx, events, free_physical_mask)
    }

    pub fn start(&self, requester: HandleId, core_idx: u32, period_ms: u64) -> Result<()> {
        self.require_admission(requester)?;
        self.scheduler.start(core_idx, period_ms)
    }

    pub fn stop(&self, requester: HandleId, core_idx: u32) -> Result<()> {
        self.require_admission(requester)?;
        self.scheduler.stop(core_idx)
    }

    pub fn reset(&self, requester: HandleId, core_idx: u32) -> Result<()> {
        self.require_admission(requester)?;
        self.scheduler.reset(core_idx)
    }

    /// `READ_COUNTING`: snapshot the current accumulated values without
    /// disturbing the running scheduler.
    pub fn read_counting(&self, requester: HandleId, core_idx: u32) -> Result<ReadOut> {
        self.require_admission(requester)?;
        let slot = self.scheduler.slot(core_idx)?;
        let info = slot.info.lock();
        Ok(ReadOut {
            round: info.timer_round,
            evts: info.events.iter().map(to_pmu_event_usr).collect(),
        })
    }

    // --- C4: Sampling Engine ------------------------------------------------

    pub fn sample_set_src(&self, requester: HandleId, core_idx: u32, ov_mask: u64) -> Result<()> {
        self.require_admission(requester)?;
        let slot = self.scheduler.slot(core_idx)?;
        slot.info.lock().ov_mask = ov_mask;
        Ok(())
    }

    pub fn sample_start(&self, requester: HandleId, core_idx: u32) -> Result<()> {
        self.require_admission(requester)?;
        // Sampling rides on the same scheduling task; enabling it only
        // requires ov_mask to already be non-zero, set by
        // `sample_set_src`. Nothing further to start here since overflow
        // delivery is driven by `deliver_overflow`, not a separate timer.
        self.scheduler.slot(core_idx).map(|_| ())
    }

    pub fn sample_stop(&self, requester: HandleId, core_idx: u32) -> Result<()> {
        self.require_admission(requester)?;
        let slot = self.scheduler.slot(core_idx)?;
        slot.info.lock().ov_mask = 0;
        Ok(())
    }

    /// `SAMPLE_GET`: drain every buffered sample frame for the core.
    pub fn sample_get(&self, requester: HandleId, core_idx: u32) -> Result<Vec<FrameChain>> {
        self.require_admission(requester)?;
        let slot = self.scheduler.slot(core_idx)?;
        Ok(slot.info.lock().drain_samples())
    }

    /// Simulated overflow-interrupt delivery: in a real driver this is
    /// the PMI ISR, invoked by hardware. Here it is invoked explicitly
    /// (by a test, or by a simulated overflow trigger) with the raw
    /// overflow-status bits and the PC/LR captured at the "interrupt".
    pub fn deliver_overflow(
        &self,
        core_idx: u32,
        ov_flags_raw: u64,
        frame: TrapFrame,
    ) -> Result<Option<u64>> {
        let slot = self.scheduler.slot(core_idx)?;
        let ov_mask = slot.info.lock().ov_mask;
        Ok(handle_pmi(&slot.info, ov_flags_raw, ov_mask, frame))
    }

    // --- SPE -----------------------------------------------------------------

    /// `SPE_INIT`: carve out the per-core sample buffer and reset the
    /// copy cursor to its start (`spe.c::spe_init`).
    pub fn spe_init(&self, requester: HandleId, core_idx: u32, backend: B) -> Result<()> {
        self.require_admission(requester)?;
        let slot = self.spe_slot(core_idx)?;
        let spe = Spe::new(backend);
        spe.reset_copy_cursor(0);
        *slot.lock() = Some(SpeSlot {
            spe,
            buffer_base: 0,
            buffer_limit: 0,
            data: vec![0u8; SPE_MEMORY_BUFFER_SIZE],
        });
        Ok(())
    }

    /// `SPE_START`: program the buffer/filter/interval registers and
    /// spawn the software watchdog task that polls for a nearly-full
    /// buffer (`spe.c`'s `PMU_CTL_SPE_START` handler plus `SPE_DPC`).
    pub fn spe_start(
        &self,
        requester: HandleId,
        core_idx: u32,
        buffer_base: u64,
        buffer_limit: u64,
        config: SpeConfig,
    ) -> Result<()> {
        self.require_admission(requester)?;
        let slot = Arc::clone(self.spe_slot(core_idx)?);
        {
            let mut guard = slot.lock();
            let spe_slot = guard
                .as_mut()
                .ok_or_else(|| DeviceError::InvalidDeviceState("SPE not initialized for this core".into()))?;
            spe_slot.buffer_base = buffer_base;
            spe_slot.buffer_limit = buffer_limit;
            spe_slot.spe.reset_copy_cursor(buffer_base);
            spe_slot.spe.start(buffer_base, buffer_limit, config);
        }

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(
                wperf_raw::spe::SPE_TIMER_PERIOD_MS,
            ));
            loop {
                interval.tick().await;
                let guard = slot.lock();
                match guard.as_ref() {
                    Some(spe_slot) if spe_slot.spe.buffer_is_full(spe_slot.buffer_limit) => {
                        spe_slot.spe.disable_on_buffer_full();
                        break;
                    }
                    Some(_) => {}
                    None => break,
                }
            }
        });
        if let Some(old) = self.spe_watchdogs.lock()[core_idx as usize].replace(handle) {
            old.abort();
        }
        Ok(())
    }

    pub fn spe_stop(&self, requester: HandleId, core_idx: u32) -> Result<()> {
        self.require_admission(requester)?;
        if let Some(handle) = self.spe_watchdogs.lock()[core_idx as usize].take() {
            handle.abort();
        }
        let slot = self.spe_slot(core_idx)?;
        let guard = slot.lock();
        let spe_slot = guard
            .as_ref()
            .ok_or_else(|| DeviceError::InvalidDeviceState("SPE not initialized for this core".into()))?;
        spe_slot.spe.stop();
        Ok(())
    }

    /// `SPE_GET_SIZE`: bytes pending collection since the copy cursor was
    /// last advanced.
    pub fn spe_get_size(&self, requester: HandleId, core_idx: u32) -> Result<u64> {
        self.require_admission(requester)?;
        let slot = self.spe_slot(core_idx)?;
        let guard = slot.lock();
        let spe_slot = guard
            .as_ref()
            .ok_or_else(|| DeviceError::InvalidDeviceState("SPE not initialized for this core".into()))?;
        Ok(spe_slot.spe.get_size())
    }

    /// `SPE_GET_BUFFER`: copy `size` bytes out of the sample buffer
    /// starting at the copy cursor, then advance it (`spe.c`'s
    /// `RtlCopyMemory(target, lastCopiedPtr, size); lastCopiedPtr +=
    /// size;`).
    pub fn spe_get_buffer(&self, requester: HandleId, core_idx: u32, size: u64) -> Result<Vec<u8>> {
        self.require_admission(requester)?;
        let slot = self.spe_slot(core_idx)?;
        let mut guard = slot.lock();
        let spe_slot = guard
            .as_mut()
            .ok_or_else(|| DeviceError::InvalidDeviceState("SPE not initialized for this core".into()))?;
        let offset = spe_slot.spe.copy_cursor().saturating_sub(spe_slot.buffer_base) as usize;
        let size = size as usize;
        let needed = offset + size;
        if needed > spe_slot.data.len() {
            return Err(DeviceError::BufferTooSmall {
                needed,
                got: spe_slot.data.len(),
            });
        }
        let bytes = spe_slot.data[offset..needed].to_vec();
        spe_slot.spe.advance_copy_cursor(size as u64);
        Ok(bytes)
    }

    /// Test-only hook to populate the simulated sample buffer, standing
    /// in for hardware actually writing profiling records into it.
    #[cfg(test)]
    fn spe_poke(&self, core_idx: u32, offset: usize, bytes: &[u8]) {
        let slot = self.spe_slot(core_idx).unwrap();
        let mut guard = slot.lock();
        let spe_slot = guard.as_mut().unwrap();
        spe_slot.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn spe_slot(&self, core_idx: u32) -> Result<&Arc<Mutex<Option<SpeSlot<B>>>>> {
        self.spe_slots
            .get(core_idx as usize)
            .ok_or_else(|| DeviceError::InvalidParameter(format!("core index {core_idx} out of range")))
    }

    /// Opcode-level input-buffer validation, the in-process stand-in for
    /// the dispatch routine's `if (inputSize != sizeof(...)) return
    /// STATUS_INVALID_PARAMETER;` checks run before any handler touches
    /// state (`device.c`'s per-opcode `inputSize` checks, e.g.
    /// `PMU_CTL_QUERY_HW_CFG`'s `inputSize != sizeof(enum
    /// pmu_ctl_action)`). Every method above still assumes this has
    /// already run; nothing here mutates `self`.
    pub fn validate_ioctl(&self, action: PmuCtlAction, in_len: usize) -> Result<()> {
        let needed = expected_min_input_len(action);
        if in_len < needed {
            return Err(DeviceError::BufferTooSmall { needed, got: in_len });
        }
        Ok(())
    }
}

/// Minimum caller-supplied input length for each opcode, modeled after
/// `device.c`'s per-opcode `sizeof(...)` checks. Variable-length
/// requests (event lists, core-index arrays) are sized by their fixed
/// header only; the scheduler itself rejects an empty or malformed body.
pub fn expected_min_input_len(action: PmuCtlAction) -> usize {
    use PmuCtlAction::*;
    match action {
        QueryHwCfg | QueryVersion => std::mem::size_of::<u32>(),
        QuerySuppEvents => 0,
        Start | Stop | Reset => std::mem::size_of::<u32>(),
        AssignEvents => std::mem::size_of::<u32>() * 2,
        ReadCounting | DsuReadCounting | DmcReadCounting => std::mem::size_of::<u32>(),
        DsuInit => std::mem::size_of::<u32>() * 2,
        DmcInit => std::mem::size_of::<u8>(),
        SampleSetSrc | SampleStart | SampleStop | SampleGet => std::mem::size_of::<u32>(),
        LockAcquire | LockRelease => 0,
        SpeInit | SpeStart | SpeStop | SpeGetSize | SpeGetBuffer => std::mem::size_of::<u32>(),
    }
}

fn to_pmu_event_usr(e: &PseudoEvent) -> PmuEventUsr {
    PmuEventUsr {
        event_idx: e.event_idx,
        filter_bits: e.filter_bits,
        value: e.value,
        scheduled: e.scheduled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coreinfo::PseudoEvent;
    use wperf_raw::SimBackend;

    fn make_device(n: usize) -> Device<SimBackend> {
        let slots: Vec<_> = (0..n)
            .map(|i| Arc::new(CoreSlot::new(i as u32, SimBackend::new(), SimBackend::new())))
            .collect();
        let spe_backends: Vec<_> = (0..n).map(|_| SimBackend::new()).collect();
        Device::new(slots, spe_backends)
    }

    #[test]
    fn second_session_is_refused_assignment() {
        let device = make_device(1);
        device.lock_acquire(1, false).unwrap();
        assert!(device
            .assign_events(2, 0, vec![PseudoEvent::new(CYCLE_EVENT_IDX, 0)], 0b1)
            .is_err());
        assert!(device
            .assign_events(1, 0, vec![PseudoEvent::new(CYCLE_EVENT_IDX, 0)], 0b1)
            .is_ok());
    }

    #[test]
    fn read_counting_reports_assigned_events() {
        let device = make_device(1);
        device.lock_acquire(1, false).unwrap();
        device
            .assign_events(1, 0, vec![PseudoEvent::new(CYCLE_EVENT_IDX, 0)], 0b1)
            .unwrap();
        let out = device.read_counting(1, 0).unwrap();
        assert_eq!(out.evts.len(), 1);
        assert_eq!(out.evts[0].event_idx, CYCLE_EVENT_IDX);
    }

    #[test]
    fn overflow_delivery_respects_sample_src_mask() {
        let device = make_device(1);
        device.lock_acquire(1, false).unwrap();
        device.sample_set_src(1, 0, 0b1).unwrap();
        let dropped = device
            .deliver_overflow(0, 0b10, TrapFrame { pc: 1, lr: 2 })
            .unwrap();
        assert!(dropped.is_none());
        let delivered = device
            .deliver_overflow(0, 0b1, TrapFrame { pc: 1, lr: 2 })
            .unwrap();
        assert_eq!(delivered, Some(0b1));
        assert_eq!(device.sample_get(1, 0).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn spe_start_requires_prior_init() {
        let device = make_device(1);
        device.lock_acquire(1, false).unwrap();
        assert!(device
            .spe_start(1, 0, 0x1000, 0x2000, SpeConfig::default())
            .is_err());
        device.spe_init(1, 0, SimBackend::new()).unwrap();
        assert!(device
            .spe_start(1, 0, 0x1000, 0x2000, SpeConfig::default())
            .is_ok());
    }

    #[test]
    fn query_hw_cfg_rejects_absent_pmu() {
        let device = make_device(1);
        device.lock_acquire(1, false).unwrap();
        // SimBackend's ID_DFR0_EL1 defaults to 0, same as an un-probed part.
        assert!(matches!(
            device.query_hw_cfg(1),
            Err(DeviceError::InvalidDeviceState(_))
        ));
    }

    #[test]
    fn query_hw_cfg_reports_topology_and_counter_map() {
        let device = make_device(2);
        device.lock_acquire(1, false).unwrap();
        let slot = device.scheduler.slot(0).unwrap();
        slot.pmu.backend().write(wperf_raw::SysReg::ID_DFR0_EL1, 0x6 << 8);
        slot.pmu.pmcr_set(5 << wperf_raw::pmu::pmcr::N_SHIFT);
        slot.pmu
            .backend()
            .write(wperf_raw::SysReg::MIDR_EL1, 0x4123_4567);
        device
            .assign_events(1, 0, vec![PseudoEvent::new(CYCLE_EVENT_IDX, 0)], 0b1)
            .unwrap();

        let cfg = device.query_hw_cfg(1).unwrap();
        assert_eq!(cfg.pmu_ver, 0x6);
        assert_eq!(cfg.gpc_num, 5);
        assert_eq!(cfg.core_num, 2);
        assert_eq!(cfg.id_aa64dfr0_value, 0x6 << 8);
        assert_ne!(cfg.counter_idx_map[0], 0xFF);
    }

    #[test]
    fn query_version_always_returns_driver_version() {
        let device = make_device(1);
        device.lock_acquire(1, false).unwrap();
        let mismatched = VersionInfo {
            major: 1,
            minor: 0,
            patch: 0,
            gitver: String::new(),
            featurestring: String::new(),
        };
        let reported = device.query_version(1, mismatched).unwrap();
        assert_eq!(
            (reported.major, reported.minor, reported.patch),
            DRIVER_VERSION
        );
    }

    #[test]
    fn query_supp_events_adds_dmc_classes_once_installed() {
        let device = make_device(1);
        device.lock_acquire(1, false).unwrap();
        let before = device.query_supp_events(1).unwrap();
        assert_eq!(before.classes.len(), 1);
        assert_eq!(before.classes[0].evt_class, EvtClass::Core);

        let array = DmcArray::new(vec![crate::dmc::DmcDescriptor::new(SimMmio::new(), 0x1000, 0x100)]);
        device.dmc_init(1, array).unwrap();
        let after = device.query_supp_events(1).unwrap();
        assert_eq!(after.classes.len(), 3);
        assert!(after.classes.iter().any(|c| c.evt_class == EvtClass::DmcClk));
        assert!(after
            .classes
            .iter()
            .any(|c| c.evt_class == EvtClass::DmcClkdiv2));
    }

    #[test]
    fn dsu_round_trip_reports_assigned_events() {
        let device = make_device(1);
        device.lock_acquire(1, false).unwrap();
        device
            .dsu_init(1, 0, vec![PseudoEvent::new(CYCLE_EVENT_IDX, 0)], 0b1)
            .unwrap();
        let out = device.dsu_read_counting(1, 0).unwrap();
        assert_eq!(out.evts.len(), 1);
        assert_eq!(out.evts[0].event_idx, CYCLE_EVENT_IDX);
    }

    #[test]
    fn dmc_round_trip_accumulates_clk_events() {
        let device = make_device(1);
        device.lock_acquire(1, false).unwrap();
        let mut desc = crate::dmc::DmcDescriptor::new(SimMmio::new(), 0x1000, 0x100);
        desc.assign_clk_events(vec![PseudoEvent::new(1, 0)]).unwrap();
        device.dmc_init(1, DmcArray::new(vec![desc])).unwrap();

        let out = device.dmc_read_counting(1, 0).unwrap();
        assert_eq!(out.clk_events.len(), 1);
        assert_eq!(out.clk_events[0].scheduled, 1);
    }

    #[tokio::test]
    async fn spe_get_size_and_buffer_advance_the_copy_cursor() {
        let device = make_device(1);
        device.lock_acquire(1, false).unwrap();
        device.spe_init(1, 0, SimBackend::new()).unwrap();
        device
            .spe_start(1, 0, 0x1000, 0x1000 + SPE_MEMORY_BUFFER_SIZE as u64, SpeConfig::default())
            .unwrap();

        let slot = Arc::clone(device.spe_slot(0).unwrap());
        slot.lock()
            .as_ref()
            .unwrap()
            .spe
            .backend()
            .write(wperf_raw::SysReg::PMBPTR_EL1, 0x1040);
        assert_eq!(device.spe_get_size(1, 0).unwrap(), 0x40);

        device.spe_poke(0, 0, &[0xAA, 0xBB]);
        let bytes = device.spe_get_buffer(1, 0, 2).unwrap();
        assert_eq!(bytes, vec![0xAA, 0xBB]);
        assert_eq!(
            slot.lock().as_ref().unwrap().spe.copy_cursor(),
            0x1000 + 2
        );

        assert!(matches!(
            device.spe_get_buffer(1, 0, SPE_MEMORY_BUFFER_SIZE as u64),
            Err(DeviceError::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn validate_ioctl_rejects_undersized_buffers() {
        let device = make_device(1);
        assert!(device.validate_ioctl(PmuCtlAction::AssignEvents, 4).is_err());
        assert!(device.validate_ioctl(PmuCtlAction::AssignEvents, 8).is_ok());
        assert!(device.validate_ioctl(PmuCtlAction::LockAcquire, 0).is_ok());
        assert!(device.validate_ioctl(PmuCtlAction::QueryHwCfg, 0).is_err());
    }
}
