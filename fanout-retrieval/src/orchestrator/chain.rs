//! Health-adjusted provider chain ordering.
//!
//! The configured chain never changes; each dispatch recomputes an
//! effective order from a health snapshot.

use crate::health::HealthSnapshot;
use crate::provider::ProviderSpec;
use crate::types::ProviderKind;

/// Compute the order in which a lane should try its providers.
///
/// Returns indices into `chain`. Demoted (unhealthy and not yet
/// probe-eligible) providers keep their relative order but move behind
/// every other provider. Keyless providers are dropped when
/// `allow_keyless` is `false`.
pub fn effective_order(
    chain: &[ProviderSpec],
    health: &HealthSnapshot,
    allow_keyless: bool,
) -> Vec<usize> {
    let eligible = chain
        .iter()
        .enumerate()
        .filter(|(_, p)| allow_keyless || p.kind == ProviderKind::Keyed);

    let (demoted, preferred): (Vec<_>, Vec<_>) = eligible.partition(|(_, p)| {
        health
            .get(&p.key())
            .is_some_and(|view| view.is_demoted())
    });

    preferred
        .into_iter()
        .chain(demoted)
        .map(|(index, _)| index)
        .collect()
}
