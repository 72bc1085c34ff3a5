//! Property tests for the session state machine as enforced by the registry

use fleetmon_core::models::{DiscoveryOrigin, Host, SessionState};
use fleetmon_core::registry::{FleetRegistry, RegistryEvent};
use proptest::prelude::*;

fn state_strategy() -> impl Strategy<Value = SessionState> {
    prop::sample::select(SessionState::ALL.to_vec())
}

proptest! {
    /// Property: The registry applies a transition exactly when the state
    /// machine allows it, and publishes one event per applied transition
    #[test]
    fn registry_enforces_state_machine(steps in prop::collection::vec(state_strategy(), 1..40)) {
        let registry = FleetRegistry::new(4);
        registry.add(Host::new("10.0.0.1", DiscoveryOrigin::Manual)).unwrap();
        let mut events = registry.subscribe();

        let mut current = SessionState::Discovered;
        let mut applied = 0;
        for next in steps {
            let result = registry.transition("10.0.0.1", next);
            if current.can_transition_to(next) {
                prop_assert_eq!(result, Ok(current));
                current = next;
                applied += 1;
            } else {
                prop_assert!(result.is_err());
            }
            prop_assert_eq!(registry.state("10.0.0.1"), Some(current));
        }

        let mut published = 0;
        while let Ok(event) = events.try_recv() {
            if let RegistryEvent::StateChanged { from, to, .. } = event {
                prop_assert!(from.can_transition_to(to));
                published += 1;
            }
        }
        prop_assert_eq!(published, applied);
    }

    /// Property: Disconnected is reachable from every state and always leads
    /// back to Connecting
    #[test]
    fn disconnect_always_possible(state in state_strategy()) {
        prop_assert!(state == SessionState::Disconnected || state.can_transition_to(SessionState::Disconnected));
        prop_assert!(SessionState::Disconnected.can_transition_to(SessionState::Connecting));
    }

    /// Property: Only Connected hosts accept samples
    #[test]
    fn samples_only_while_connected(path in prop::collection::vec(state_strategy(), 0..8)) {
        let registry = FleetRegistry::new(4);
        registry.add(Host::new("10.0.0.1", DiscoveryOrigin::Manual)).unwrap();
        for next in path {
            let _ = registry.transition("10.0.0.1", next);
        }

        let connected = registry.state("10.0.0.1") == Some(SessionState::Connected);
        let recorded = registry
            .record_sample("10.0.0.1", fleetmon_core::Sample::empty())
            .is_ok();
        prop_assert_eq!(recorded, connected);
    }
}
