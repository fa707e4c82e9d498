//! IOCTL wire protocol (C6): the bit-for-bit structures and function
//! codes exchanged across the kernel/user device-object boundary,
//! grounded on `original_source/wperf-common/iorequest.h` and
//! `macros.h`. Per spec.md §9, the boundary itself is realized as an
//! in-process call rather than a real `DeviceIoControl`, but the wire
//! shapes are kept unchanged so a real driver could adopt this crate
//! without renegotiating the protocol.

pub const MAX_PMU_CTL_CORES_COUNT: usize = 128;
pub const MAX_MANAGED_CORE_EVENTS: usize = 128;
pub const MAX_MANAGED_DSU_EVENTS: usize = 32;
pub const MAX_MANAGED_DMC_CLK_EVENTS: usize = 4;
pub const MAX_MANAGED_DMC_CLKDIV2_EVENTS: usize = 8;
pub const AARCH64_MAX_HWC_SUPP: usize = 31;
pub const SAMPLE_CHAIN_BUFFER_SIZE: usize = 128;
pub const CYCLE_COUNTER_IDX: u32 = 31;
pub const INVALID_COUNTER_IDX: u32 = 32;
/// Sentinel logical event index marking the fixed cycle counter.
pub const CYCLE_EVENT_IDX: u32 = u32::MAX;
pub const ALL_CORE: u32 = u32::MAX;
pub const ALL_DMC_CHANNEL: u8 = u8::MAX;

pub const MAX_GITVER_SIZE: usize = 32;
pub const MAX_FEATURESTRING_SIZE: usize = 128;
pub const MAX_DEVICE_ID_STR_SIZE: usize = 128;

/// The WPERF device control-code function offset, device type, and
/// method, kept only as documentation of where real function codes
/// would live (spec.md §5: `(DEVICE_TYPE<<16) | (ACCESS<<14) |
/// (FUNCTION<<2) | METHOD`). Dispatch in this crate is by [`PmuCtlAction`]
/// directly rather than a raw 32-bit code, since no real
/// `DeviceIoControl` transport crosses a process boundary here; every
/// opcode still goes through [`crate::device::Device::validate_ioctl`]'s
/// buffer-size check before the matching method runs.
pub const PMU_CTL_ACTION_OFFSET: u32 = 0x900;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum EvtClass {
    #[default]
    Core = 0,
    Dsu,
    DmcClk,
    DmcClkdiv2,
}

/// One event class's supported-event list, as returned by `QUERY_SUPP_EVENTS`.
#[derive(Debug, Clone, Default)]
pub struct EvtClassEvents {
    pub evt_class: EvtClass,
    pub events: Vec<u16>,
}

#[derive(Debug, Clone, Default)]
pub struct SuppEvents {
    pub classes: Vec<EvtClassEvents>,
}

/// Supplemented core event codes for `QUERY_SUPP_EVENTS`'s `EVT_CORE`
/// class: the pack carries no `pmu_events.h`/`.cpp` event-name table (see
/// `wperf-agent/events.rs`), so this is the same small, hand-supplemented
/// subset of Armv8 common-architectural event numbers from the Arm ARM,
/// duplicated here rather than imported since `wperf-core` cannot depend
/// on `wperf-agent`.
pub const CORE_SUPP_EVENT_CODES: &[u16] = &[
    0x08, 0x1b, 0x73, 0x75, 0x74, 0x70, 0x71, 0x14, 0x01, 0x27, 0x28, 0x04, 0x03, 0x16, 0x17, 0x26,
    0x02, 0x2f, 0x30, 0x25, 0x05, 0x34, 0x2d,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum StatusFlag {
    Idle,
    Busy,
    LockAcquired,
    InsufficientResources,
    UnknownError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PmuCtlAction {
    Start = PMU_CTL_ACTION_OFFSET,
    Stop,
    Reset,
    QueryHwCfg,
    QuerySuppEvents,
    QueryVersion,
    AssignEvents,
    ReadCounting,
    DsuInit,
    DsuReadCounting,
    DmcInit,
    DmcReadCounting,
    SampleSetSrc,
    SampleStart,
    SampleStop,
    SampleGet,
    LockAcquire,
    LockRelease,
    SpeInit,
    SpeGetSize,
    SpeGetBuffer,
    SpeStart,
    SpeStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockFlag {
    Get,
    GetForce,
    Release,
}

#[derive(Debug, Clone, Copy)]
pub struct LockRequest {
    pub flag: LockFlag,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SampleSrcDesc {
    pub event_src: u32,
    pub interval: u32,
    pub filter_bits: u32,
}

#[derive(Debug, Clone)]
pub struct PmuSampleSetSrcHdr {
    pub core_idx: u32,
    pub sources: Vec<SampleSrcDesc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PmuSampleSummary {
    pub sample_generated: u64,
    pub sample_dropped: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameChain {
    pub lr: u64,
    pub pc: u64,
    pub ov_flags: u64,
    pub spe_event_idx: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct PmuCtlGetSampleHdr {
    pub core_idx: u32,
}

#[derive(Debug, Clone, Default)]
pub struct PmuSamplePayload {
    pub payload: Vec<FrameChain>,
}

#[derive(Debug, Clone, Default)]
pub struct VersionInfo {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    pub gitver: String,
    pub featurestring: String,
}

#[derive(Debug, Clone, Default)]
pub struct HwCfg {
    pub pmu_ver: u8,
    pub fpc_num: u8,
    pub gpc_num: u8,
    pub total_gpc_num: u8,
    pub vendor_id: u8,
    pub variant_id: u8,
    pub arch_id: u8,
    pub rev_id: u8,
    pub part_id: u16,
    pub core_num: u16,
    pub midr_value: u64,
    pub id_aa64dfr0_value: u64,
    /// [`AARCH64_MAX_HWC_SUPP`] + 1 entries; see
    /// `wperf_raw::CounterIndexMap::to_wire_array`.
    pub counter_idx_map: [u8; AARCH64_MAX_HWC_SUPP + 1],
    pub device_id_str: String,
    pub pmbidr_el1_value: u64,
    pub pmsidr_el1_value: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PmuCtlCoresCountHdr {
    pub cores_count: usize,
}

/// Control/enable flags in `pmu_ctl_hdr.flags`.
pub mod ctl_flag {
    pub const CORE: u32 = 1 << 0;
    pub const DSU: u32 = 1 << 1;
    pub const DMC: u32 = 1 << 2;
    pub const SPE: u32 = 1 << 3;
}

#[derive(Debug, Clone)]
pub struct PmuCtlHdr {
    pub cores_idx: Vec<u8>,
    pub period: i32,
    pub dmc_idx: u8,
    pub flags: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct PmuCtlEvtAssignHdr {
    pub core_idx: u32,
    pub dmc_idx: u8,
    pub filter_bits: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PmuEventUsr {
    pub event_idx: u32,
    pub filter_bits: u64,
    pub value: u64,
    pub scheduled: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ReadOut {
    pub round: u64,
    pub evts: Vec<PmuEventUsr>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DsuCtlHdr {
    pub cluster_num: u16,
    pub cluster_size: u16,
}

#[derive(Debug, Clone, Default)]
pub struct DsuReadOut {
    pub round: u64,
    pub evts: Vec<PmuEventUsr>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DsuCfg {
    pub fpc_num: u8,
    pub gpc_num: u8,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DmcCfg {
    pub clk_fpc_num: u8,
    pub clk_gpc_num: u8,
    pub clkdiv2_fpc_num: u8,
    pub clkdiv2_gpc_num: u8,
}

#[derive(Debug, Clone, Default)]
pub struct DmcReadOut {
    pub clk_events: Vec<PmuEventUsr>,
    pub clkdiv2_events: Vec<PmuEventUsr>,
}

#[derive(Debug, Clone)]
pub struct DmcCtlHdr {
    pub dmc_num: u8,
    pub addr: Vec<u64>,
}

/// `SPE_CTL_FLAG_*` config flags.
pub mod spe_ctl_flag {
    pub const RND: u64 = 1 << 0;
    pub const TS: u64 = 1 << 1;
    pub const MIN: u64 = 1 << 2;
}

/// `SPE_OPERATON_FILTER_*` bits.
pub mod spe_operation_filter {
    pub const B: u8 = 0b001;
    pub const LD: u8 = 0b010;
    pub const ST: u8 = 0b100;
}

#[derive(Debug, Clone, Default)]
pub struct SpeCtlHdr {
    pub cores_idx: Vec<u8>,
    pub buffer_size: u64,
    pub operation_filter: u8,
    pub event_filter: u64,
    pub config_flags: u64,
    pub interval: u32,
}
