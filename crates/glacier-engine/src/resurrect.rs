//! Negative-progress rollback and referral rewiring.

use glacier_core::user::{Referral, User};

/// Apply a recorded rollback decision, returning the pending amounts to
/// propagate to the referrers.
///
/// `Some(true)` restores: previously slashed totals are queued back through
/// the solo pending buffer so the next fold re-mints them; nothing propagates
/// outward. `Some(false)` forfeits: the balance partitions are zeroed and the
/// contributions held for the referrers are drained out of their pools via
/// negative pending amounts. The decision is consumed either way.
pub fn resurrect(usr: &mut User) -> (f64, f64) {
    let Some(restore) = usr.rollback_negative_mining.take() else {
        return (0.0, 0.0);
    };
    if restore {
        usr.balance_solo_pending += usr.balance_total_slashed;
        (0.0, 0.0)
    } else {
        let pending_for_t_minus1 = -usr.balance_for_t_minus1;
        let pending_for_t0 = -usr.balance_for_t0;
        usr.balance_solo = 0.0;
        usr.balance_t0 = 0.0;
        usr.balance_t1 = 0.0;
        usr.balance_t2 = 0.0;
        usr.balance_for_t0 = 0.0;
        usr.balance_for_t_minus1 = 0.0;
        (pending_for_t_minus1, pending_for_t0)
    }
}

/// Rewire the referral links when `id_t0` carries the "assigned but the
/// referrer has never mined" sentinel.
///
/// If the referrer's record shows they have mined by now (their
/// `balance_last_updated_at` is set), flip `id_t0` positive and recompute
/// `id_t_minus1` from the referrer's own link. Returns whether anything
/// changed.
pub fn rewire_referrals(usr: &mut User, t0: Option<&Referral>) -> bool {
    if usr.id_t0 >= 0 {
        return false;
    }
    let Some(t0) = t0 else { return false };
    if t0.balance_last_updated_at.is_none() {
        return false;
    }
    usr.id_t0 = -usr.id_t0;
    usr.id_t_minus1 = t0.id_t0.abs();
    true
}
