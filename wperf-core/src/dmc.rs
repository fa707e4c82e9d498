//! DMC descriptor lifecycle (spec.md §3 "DMC Descriptor"): per memory
//! controller, an MMIO region plus up to 4 clock events and up to 8
//! clkdiv2 events. Descriptors are created on `DMC_INIT` and torn down
//! with the device; grounded on `original_source/wperf-driver/dmc.h`.

use crate::coreinfo::PseudoEvent;
use crate::error::Result;
use wperf_raw::dmc::{DmcChannel, MmioRegion, DMC_CLKDIV2_NUMGPC, DMC_CLK_NUMGPC};

pub struct DmcDescriptor<M: MmioRegion> {
    pub channel: DmcChannel<M>,
    pub iomem_start: u64,
    pub iomem_len: u64,
    pub clk_events: Vec<PseudoEvent>,
    pub clkdiv2_events: Vec<PseudoEvent>,
}

impl<M: MmioRegion> DmcDescriptor<M> {
    pub fn new(mmio: M, iomem_start: u64, iomem_len: u64) -> Self {
        Self {
            channel: DmcChannel::new(mmio),
            iomem_start,
            iomem_len,
            clk_events: Vec::new(),
            clkdiv2_events: Vec::new(),
        }
    }

    pub fn assign_clk_events(&mut self, events: Vec<PseudoEvent>) -> Result<()> {
        for (i, event) in events.iter().enumerate() {
            if i >= DMC_CLK_NUMGPC {
                break;
            }
            self.channel.enable_event(i as u8, event.event_idx as u16);
        }
        self.clk_events = events;
        Ok(())
    }

    pub fn assign_clkdiv2_events(&mut self, events: Vec<PseudoEvent>) -> Result<()> {
        for (i, event) in events.iter().enumerate() {
            if i >= DMC_CLKDIV2_NUMGPC {
                break;
            }
            self.channel
                .enable_event((DMC_CLK_NUMGPC + i) as u8, event.event_idx as u16);
        }
        self.clkdiv2_events = events;
        Ok(())
    }

    /// Read every enabled counter and accumulate into the event list
    /// (`original_source/wperf-driver/dpc.c`'s `UpdateDmcCounting`).
    pub fn update_counting(&mut self) {
        for (i, event) in self.clk_events.iter_mut().enumerate() {
            event.value += self.channel.counter_read(i as u8);
            event.scheduled += 1;
        }
        for (i, event) in self.clkdiv2_events.iter_mut().enumerate() {
            event.value += self.channel.counter_read((DMC_CLK_NUMGPC + i) as u8);
            event.scheduled += 1;
        }
    }
}

/// Owns every DMC descriptor on the system (`dmcs_desc` in the original),
/// indexed by physical DMC channel number.
pub struct DmcArray<M: MmioRegion> {
    descriptors: Vec<DmcDescriptor<M>>,
}

impl<M: MmioRegion> DmcArray<M> {
    pub fn new(descriptors: Vec<DmcDescriptor<M>>) -> Self {
        Self { descriptors }
    }

    pub fn get_mut(&mut self, dmc_idx: u8) -> Result<&mut DmcDescriptor<M>> {
        self.descriptors
            .get_mut(dmc_idx as usize)
            .ok_or_else(|| crate::error::DeviceError::InvalidParameter(format!("dmc index {dmc_idx} out of range")))
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coreinfo::PseudoEvent;
    use wperf_raw::dmc::SimMmio;

    #[test]
    fn assign_and_update_accumulates_clk_events() {
        let mut desc = DmcDescriptor::new(SimMmio::new(), 0x1000_0000, 0x1000);
        desc.assign_clk_events(vec![PseudoEvent::new(1, 0)]).unwrap();
        desc.update_counting();
        assert_eq!(desc.clk_events[0].scheduled, 1);
    }

    #[test]
    fn dmc_array_rejects_out_of_range_index() {
        let mut array = DmcArray::new(vec![DmcDescriptor::new(SimMmio::new(), 0, 0x1000)]);
        assert!(array.get_mut(3).is_err());
        assert!(array.get_mut(0).is_ok());
    }
}
