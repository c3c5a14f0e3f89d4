use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OperationLabels {
	pub kind: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FamilyLabels {
	pub family: &'static str,
}

/// Ambient metrics, mirroring the teacher's `telemetry/metrics.rs` /
/// `relay/metrics.rs` `Family<Labels, Counter>` + `Registry::register`
/// pattern. Registration is left to the host application, same as the
/// teacher leaves `Registry` ownership to its caller.
pub struct Metrics {
	pub operations_started: Family<OperationLabels, Counter>,
	pub operations_finished: Family<OperationLabels, Counter>,
	pub listener_restarts: Counter,
	pub connectivity_transitions: Family<FamilyLabels, Counter>,
}

impl Metrics {
	pub fn new(registry: &mut Registry) -> Self {
		let operations_started = Family::default();
		registry.register(
			"dht_proxy_operations_started",
			"Number of one-shot operations started",
			operations_started.clone(),
		);

		let operations_finished = Family::default();
		registry.register(
			"dht_proxy_operations_finished",
			"Number of one-shot operations that reached a terminal state",
			operations_finished.clone(),
		);

		let listener_restarts = Counter::default();
		registry.register(
			"dht_proxy_listener_restarts",
			"Number of times listeners were rebuilt after a connectivity transition",
			listener_restarts.clone(),
		);

		let connectivity_transitions = Family::default();
		registry.register(
			"dht_proxy_connectivity_transitions",
			"Number of Disconnected -> Connected transitions observed per family",
			connectivity_transitions.clone(),
		);

		Metrics {
			operations_started,
			operations_finished,
			listener_restarts,
			connectivity_transitions,
		}
	}
}
