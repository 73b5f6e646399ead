//! Property-based tests for the renderer control plane.
//!
//! The session pool never hands out an id twice, any well-formed update is
//! accepted for any slot counts, and malformed updates fail cleanly.

use std::collections::HashSet;
use std::sync::Arc;

use audren_core::GuestAddr;
use audren_renderer::{
    ExecutionMode, FlatGuestMemory, MAX_SESSIONS, Manager, RendererError, RendererParameters, System,
    UpdateRequest, UpdateResponse,
};
use proptest::prelude::*;

fn system(params: &RendererParameters) -> System {
    let memory = Arc::new(FlatGuestMemory::new(GuestAddr::new(0x10_0000), 0x1000));
    let mut system = System::new(memory);
    system
        .initialize(params, params.work_buffer_size(), 1, 0)
        .unwrap();
    system
}

fn arb_params() -> impl Strategy<Value = RendererParameters> {
    (0u32..4, 0u32..4, 1u32..3, 0u32..3, 1u32..=12, any::<bool>()).prop_map(
        |(voices, effects, sinks, sub_mixes, revision, low_rate)| RendererParameters {
            voice_count: voices,
            effect_count: effects,
            sink_count: sinks,
            sub_mix_count: sub_mixes,
            mix_buffer_count: 8,
            sample_rate: if low_rate { 32_000 } else { 48_000 },
            sample_count: if low_rate { 160 } else { 240 },
            revision: audren_core::Revision::new(revision).to_tag(),
            execution_mode: ExecutionMode::Manual,
            ..Default::default()
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Acquire/release sequences keep held ids unique and the count exact.
    #[test]
    fn session_ids_stay_unique(ops in proptest::collection::vec(any::<bool>(), 0..64)) {
        let manager = Manager::new();
        let mut held: Vec<usize> = Vec::new();
        for acquire in ops {
            if acquire {
                match manager.acquire_session() {
                    Ok(id) => {
                        prop_assert!(!held.contains(&id));
                        held.push(id);
                    }
                    Err(e) => {
                        prop_assert_eq!(e, RendererError::OutOfSessions);
                        prop_assert_eq!(held.len(), MAX_SESSIONS);
                    }
                }
            } else if let Some(id) = held.pop() {
                prop_assert!(manager.release_session(id).is_ok());
            }
            prop_assert_eq!(manager.active_count(), held.len());
            prop_assert_eq!(held.iter().collect::<HashSet<_>>().len(), held.len());
        }
    }

    /// A default update is accepted at every revision and slot layout, and
    /// the response carries one status per slot.
    #[test]
    fn default_update_is_accepted(params in arb_params(), start in any::<bool>()) {
        let mut s = system(&params);
        if start {
            s.start().unwrap();
        }
        let input = UpdateRequest::new(&params).encode().unwrap();
        let mut output = vec![0u8; UpdateResponse::size_for(&params)];
        prop_assert!(s.request_update(&input, &mut output, &mut []).is_ok());

        let res = UpdateResponse::decode(&output, params.revision()).unwrap();
        prop_assert_eq!(res.memory_pools.len(), params.memory_pool_count());
        prop_assert_eq!(res.voices.len(), params.voice_count as usize);
        prop_assert_eq!(res.effects.len(), params.effect_count as usize);
        prop_assert_eq!(res.sinks.len(), params.sink_count as usize);
        prop_assert_eq!(res.behavior.error_count, 0);
        prop_assert_eq!(s.frames_elapsed(), u64::from(start));
    }

    /// Any truncation of a valid update is rejected without panicking.
    #[test]
    fn truncated_update_is_rejected(params in arb_params(), cut in 0.0f64..1.0) {
        let mut s = system(&params);
        let input = UpdateRequest::new(&params).encode().unwrap();
        let len = ((input.len() as f64) * cut) as usize;
        let mut output = vec![0u8; UpdateResponse::size_for(&params)];
        prop_assert!(matches!(
            s.request_update(&input[..len], &mut output, &mut []),
            Err(RendererError::InvalidUpdateInfo(_))
        ));
    }

    /// Generation is deterministic for identical state.
    #[test]
    fn generation_is_deterministic(params in arb_params()) {
        let input = UpdateRequest::new(&params).encode().unwrap();
        let mut lists = Vec::new();
        for _ in 0..2 {
            let mut s = system(&params);
            let mut output = vec![0u8; UpdateResponse::size_for(&params)];
            s.request_update(&input, &mut output, &mut []).unwrap();
            let list = s.generate_command_list();
            lists.push(list.commands.iter().map(|e| (e.command.kind(), e.enabled, e.estimated_time)).collect::<Vec<_>>());
        }
        prop_assert_eq!(&lists[0], &lists[1]);
    }
}
