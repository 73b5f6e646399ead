//! Effect slots: client parameters, workbuffer attachments and lifecycle.
//!
//! The DSP state of an effect lives with the render resources so the
//! coprocessor can own it while a list runs. What stays here is everything
//! the control plane needs: the decoded parameters, where the effect sits in
//! the mix graph and which guest buffers it was given.

use audren_core::{ErrorInfo, HostAddr};
use audren_effects::{
    EffectParameters, EffectType, LightLimiterStatistics, OutStatus, ParameterState, RESULT_STATE_SIZE, UsageState,
    is_channel_count_valid,
};

use crate::error::Result;
use crate::memory_pool::{AddressInfo, PoolMapper};
use crate::wire::{EffectInParameter, EffectOutStatus, UNUSED_MIX_ID};

/// Workbuffers an effect can attach.
pub const MAX_WORKBUFFERS: usize = 2;

/// One effect slot.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectInfo {
    /// Effect kind.
    pub effect_type: EffectType,
    /// Process the effect; a disabled effect passes audio through.
    pub enabled: bool,
    /// Owning mix.
    pub mix_id: i32,
    /// Position within the owning mix.
    pub process_order: i32,
    /// Lifecycle as seen by command generation.
    pub usage: UsageState,
    /// A workbuffer is outside every pool.
    pub buffer_unmapped: bool,
    /// Decoded type-specific parameters.
    pub params: EffectParameters,
    /// Attached guest buffers. Aux uses send and return, the others one.
    pub workbuffers: [AddressInfo; MAX_WORKBUFFERS],
}

impl Default for EffectInfo {
    fn default() -> Self {
        Self {
            effect_type: EffectType::Invalid,
            enabled: false,
            mix_id: UNUSED_MIX_ID,
            process_order: -1,
            usage: UsageState::Invalid,
            buffer_unmapped: false,
            params: EffectParameters::None,
            workbuffers: [AddressInfo::default(); MAX_WORKBUFFERS],
        }
    }
}

fn channel_count_max(params: &EffectParameters) -> Option<u16> {
    match params {
        EffectParameters::Delay(p) => Some(p.channel_count_max),
        EffectParameters::Reverb(p) => Some(p.channel_count_max),
        EffectParameters::LightLimiter(p) => Some(p.channel_count_max),
        _ => None,
    }
}

impl EffectInfo {
    /// An unused slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets everything and takes on `ty`.
    pub fn reset(&mut self, ty: EffectType) {
        *self = Self {
            effect_type: ty,
            ..Self::default()
        };
    }

    /// Drops every workbuffer pool association.
    pub fn force_unmap_buffers(&mut self) {
        for wb in &mut self.workbuffers {
            if !wb.address().is_null() {
                PoolMapper::force_unmap(wb);
            }
        }
    }

    /// True if the effect produces no commands.
    pub fn should_skip(&self) -> bool {
        self.effect_type == EffectType::Invalid || self.buffer_unmapped
    }

    /// True if the record points the effect's buffers somewhere other than
    /// where they are attached now.
    fn buffers_moved(&self, params: &EffectInParameter) -> bool {
        let [first, second] = &self.workbuffers;
        match self.params {
            EffectParameters::Aux(aux) => {
                first.address() != aux.send_buffer_info_address || second.address() != aux.return_buffer_info_address
            }
            EffectParameters::Capture(aux) => first.address() != aux.send_buffer_info_address,
            EffectParameters::Delay(_) | EffectParameters::Reverb(_) | EffectParameters::LightLimiter(_) => {
                first.address() != params.workbuffer || first.size() != params.workbuffer_size
            }
            _ => false,
        }
    }

    /// Applies one record. A failed attachment is reported in `error`.
    ///
    /// A type change unmaps the old buffers and starts the slot over.
    /// Workbuffers are (re)attached when the record is new, an earlier
    /// attachment failed or a buffer address changed. Reattaching also
    /// restarts the DSP state.
    pub fn update(&mut self, error: &mut ErrorInfo, params: &EffectInParameter, mapper: &PoolMapper) -> Result<()> {
        *error = ErrorInfo::SUCCESS;
        if self.effect_type != params.effect_type {
            self.force_unmap_buffers();
            self.reset(params.effect_type);
        }

        let incoming = EffectParameters::decode(params.effect_type, &params.specific)?;
        let accept = channel_count_max(&incoming).is_none_or(is_channel_count_valid);
        if accept {
            self.params.merge(incoming);
            self.mix_id = params.mix_id;
            self.process_order = params.process_order;
            self.enabled = params.enabled;
        } else {
            tracing::warn!(effect = ?params.effect_type, "effect record with unsupported channel_count_max ignored");
        }

        if !(self.buffer_unmapped || params.is_new || self.buffers_moved(params)) {
            return Ok(());
        }

        match self.params {
            EffectParameters::Aux(aux) => {
                self.usage = UsageState::New;
                let size = aux.ring_size();
                let mut return_error = ErrorInfo::SUCCESS;
                let send =
                    mapper.try_attach_buffer(error, &mut self.workbuffers[0], aux.send_buffer_info_address, size);
                let ret = mapper.try_attach_buffer(
                    &mut return_error,
                    &mut self.workbuffers[1],
                    aux.return_buffer_info_address,
                    size,
                );
                if error.is_success() {
                    *error = return_error;
                }
                self.buffer_unmapped = !send || !ret;
            }
            EffectParameters::Capture(aux) => {
                self.usage = UsageState::New;
                self.buffer_unmapped = !mapper.try_attach_buffer(
                    error,
                    &mut self.workbuffers[0],
                    aux.send_buffer_info_address,
                    aux.ring_size(),
                );
            }
            EffectParameters::Delay(_) | EffectParameters::Reverb(_) | EffectParameters::LightLimiter(_) => {
                self.usage = UsageState::New;
                self.params.set_state(ParameterState::Initialized);
                self.buffer_unmapped = !mapper.try_attach_buffer(
                    error,
                    &mut self.workbuffers[0],
                    params.workbuffer,
                    params.workbuffer_size,
                );
            }
            _ => {
                self.usage = UsageState::New;
                self.buffer_unmapped = false;
            }
        }
        Ok(())
    }

    /// Per-tick transition after the effect's commands were generated.
    pub fn update_for_command_generation(&mut self) {
        self.usage = if self.enabled {
            UsageState::Enabled
        } else {
            UsageState::Disabled
        };
        if self.params.state().is_some() {
            self.params.set_state(ParameterState::Updated);
        }
    }

    /// Lifecycle state to report. `renderer_active` is false while the
    /// session is stopped.
    pub fn store_status(&self, renderer_active: bool) -> OutStatus {
        if self.effect_type == EffectType::Invalid {
            return OutStatus::Invalid;
        }
        if renderer_active {
            if self.usage == UsageState::Disabled {
                OutStatus::Removed
            } else {
                OutStatus::Used
            }
        } else if self.usage == UsageState::New {
            OutStatus::Used
        } else {
            OutStatus::Removed
        }
    }

    /// Full status record. `v2` selects the layout with a result state,
    /// which carries the limiter statistics when there are any.
    pub fn out_status(
        &self,
        renderer_active: bool,
        v2: bool,
        statistics: Option<&LightLimiterStatistics>,
    ) -> Result<EffectOutStatus> {
        let result_state = if v2 {
            let mut raw = [0u8; RESULT_STATE_SIZE];
            if let Some(stats) = statistics {
                stats.encode(&mut audren_core::Writer::new(&mut raw))?;
            }
            Some(raw)
        } else {
            None
        };
        Ok(EffectOutStatus {
            state: self.store_status(renderer_active),
            result_state,
        })
    }

    /// Host address of workbuffer `index`, pinning its pool for this tick.
    pub fn workbuffer(&self, index: usize, mapper: &mut PoolMapper) -> HostAddr {
        self.workbuffers
            .get(index)
            .map_or(HostAddr::NULL, |wb| wb.get_reference(mapper, true))
    }
}

/// Every effect slot of a session.
#[derive(Debug, Clone, Default)]
pub struct EffectContext {
    infos: Vec<EffectInfo>,
}

impl EffectContext {
    /// `count` unused effects.
    pub fn new(count: usize) -> Self {
        Self {
            infos: vec![EffectInfo::new(); count],
        }
    }

    /// Effect slots.
    pub fn count(&self) -> usize {
        self.infos.len()
    }

    /// Effect `index`.
    pub fn info(&self, index: usize) -> Option<&EffectInfo> {
        self.infos.get(index)
    }

    /// Effect `index`, mutably.
    pub fn info_mut(&mut self, index: usize) -> Option<&mut EffectInfo> {
        self.infos.get_mut(index)
    }

    /// Effects in slot order.
    pub fn infos(&self) -> &[EffectInfo] {
        &self.infos
    }

    /// `(slot, mix_id, process_order)` of every effect, for mix updates.
    pub fn assignments(&self) -> impl Iterator<Item = (usize, i32, i32)> + '_ {
        self.infos
            .iter()
            .enumerate()
            .filter(|(_, e)| e.effect_type != EffectType::Invalid)
            .map(|(i, e)| (i, e.mix_id, e.process_order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audren_core::{GuestAddr, Writer};
    use audren_effects::SPECIFIC_SIZE;

    use crate::wire::{MemoryPoolInParameter, PoolState};

    fn mapper() -> PoolMapper {
        let mut m = PoolMapper::new(1);
        m.update(
            0,
            &MemoryPoolInParameter {
                address: GuestAddr::new(0x40_0000),
                size: 0x1_0000,
                state: PoolState::RequestAttach,
            },
        )
        .unwrap();
        m
    }

    fn delay_record(is_new: bool, channel_max: u16, workbuffer: u64) -> EffectInParameter {
        let mut specific = [0u8; SPECIFIC_SIZE];
        {
            let w = &mut Writer::new(&mut specific);
            w.zeros(12).unwrap();
            w.u16(channel_max).unwrap();
            w.u16(channel_max).unwrap();
        }
        EffectInParameter {
            effect_type: EffectType::Delay,
            is_new,
            enabled: true,
            mix_id: 0,
            workbuffer: GuestAddr::new(workbuffer),
            workbuffer_size: 0x100,
            process_order: 0,
            specific,
        }
    }

    // --- update ---

    #[test]
    fn new_effect_attaches_and_initializes() {
        let m = mapper();
        let mut e = EffectInfo::new();
        let mut err = ErrorInfo::SUCCESS;
        e.update(&mut err, &delay_record(true, 2, 0x40_0000), &m).unwrap();
        assert!(err.is_success());
        assert!(!e.buffer_unmapped);
        assert_eq!(e.usage, UsageState::New);
        assert_eq!(e.params.state(), Some(ParameterState::Initialized));
        assert!(e.workbuffers[0].is_mapped());
    }

    #[test]
    fn unmapped_workbuffer_marks_effect_skipped() {
        let m = mapper();
        let mut e = EffectInfo::new();
        let mut err = ErrorInfo::SUCCESS;
        e.update(&mut err, &delay_record(true, 2, 0x90_0000), &m).unwrap();
        assert!(!err.is_success());
        assert!(e.should_skip());
    }

    #[test]
    fn invalid_channel_max_keeps_previous_parameters() {
        let m = mapper();
        let mut e = EffectInfo::new();
        let mut err = ErrorInfo::SUCCESS;
        e.update(&mut err, &delay_record(true, 2, 0x40_0000), &m).unwrap();
        let before = e.params;
        let mut bad = delay_record(false, 3, 0x40_0000);
        bad.mix_id = 5;
        e.update(&mut err, &bad, &m).unwrap();
        assert_eq!(e.params, before);
        assert_eq!(e.mix_id, 0);
    }

    #[test]
    fn moved_workbuffer_is_reattached() {
        let m = mapper();
        let mut e = EffectInfo::new();
        let mut err = ErrorInfo::SUCCESS;
        e.update(&mut err, &delay_record(true, 2, 0x40_0000), &m).unwrap();
        e.update_for_command_generation();

        e.update(&mut err, &delay_record(false, 2, 0x40_8000), &m).unwrap();
        assert!(err.is_success());
        assert_eq!(e.workbuffers[0].address(), GuestAddr::new(0x40_8000));
        assert!(e.workbuffers[0].is_mapped());
        assert_eq!(e.usage, UsageState::New);
    }

    #[test]
    fn workbuffer_moved_outside_pools_is_reported() {
        let m = mapper();
        let mut e = EffectInfo::new();
        let mut err = ErrorInfo::SUCCESS;
        e.update(&mut err, &delay_record(true, 2, 0x40_0000), &m).unwrap();

        e.update(&mut err, &delay_record(false, 2, 0x90_0000), &m).unwrap();
        assert_eq!(err.address, GuestAddr::new(0x90_0000));
        assert_eq!(e.workbuffers[0].address(), GuestAddr::new(0x90_0000));
        assert!(e.buffer_unmapped);
        assert!(e.should_skip());
    }

    #[test]
    fn unchanged_workbuffer_keeps_state() {
        let m = mapper();
        let mut e = EffectInfo::new();
        let mut err = ErrorInfo::SUCCESS;
        e.update(&mut err, &delay_record(true, 2, 0x40_0000), &m).unwrap();
        e.update_for_command_generation();
        e.update(&mut err, &delay_record(false, 2, 0x40_0000), &m).unwrap();
        assert!(err.is_success());
        assert_eq!(e.usage, UsageState::Enabled);
        assert!(e.workbuffers[0].is_mapped());
    }

    #[test]
    fn type_change_resets_slot() {
        let m = mapper();
        let mut e = EffectInfo::new();
        let mut err = ErrorInfo::SUCCESS;
        e.update(&mut err, &delay_record(true, 2, 0x40_0000), &m).unwrap();
        let mixer = EffectInParameter {
            effect_type: EffectType::BufferMixer,
            is_new: true,
            ..Default::default()
        };
        e.update(&mut err, &mixer, &m).unwrap();
        assert_eq!(e.effect_type, EffectType::BufferMixer);
        assert!(!e.workbuffers[0].is_mapped());
    }

    // --- status ---

    #[test]
    fn status_follows_usage() {
        let mut e = EffectInfo::new();
        assert_eq!(e.store_status(true), OutStatus::Invalid);
        e.effect_type = EffectType::Delay;
        e.usage = UsageState::New;
        assert_eq!(e.store_status(false), OutStatus::Used);
        assert_eq!(e.store_status(true), OutStatus::Used);
        e.enabled = false;
        e.update_for_command_generation();
        assert_eq!(e.store_status(true), OutStatus::Removed);
        assert_eq!(e.store_status(false), OutStatus::Removed);
    }

    #[test]
    fn generation_settles_parameter_state() {
        let m = mapper();
        let mut e = EffectInfo::new();
        let mut err = ErrorInfo::SUCCESS;
        e.update(&mut err, &delay_record(true, 2, 0x40_0000), &m).unwrap();
        e.update_for_command_generation();
        assert_eq!(e.usage, UsageState::Enabled);
        assert_eq!(e.params.state(), Some(ParameterState::Updated));
    }

    #[test]
    fn v2_status_carries_result_state() {
        let e = EffectInfo {
            effect_type: EffectType::LightLimiter,
            ..Default::default()
        };
        let stats = LightLimiterStatistics::default();
        let s = e.out_status(true, true, Some(&stats)).unwrap();
        assert!(s.result_state.is_some());
        assert!(e.out_status(true, false, None).unwrap().result_state.is_none());
    }

    #[test]
    fn assignments_skip_unused_slots() {
        let mut ctx = EffectContext::new(3);
        let e = ctx.info_mut(1).unwrap();
        e.effect_type = EffectType::BufferMixer;
        e.mix_id = 2;
        e.process_order = 0;
        assert_eq!(ctx.assignments().collect::<Vec<_>>(), vec![(1, 2, 0)]);
    }
}
