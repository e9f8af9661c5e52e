use crate::BPM_LIMITS;

/// Direct-match tolerance against the anchor tempo, in BPM.
const TOLERANCE: f64 = 4.0;

/// Octave-ambiguity factors tried during the candidate search.
const FACTORS: [f64; 3] = [1.0, 2.0, 3.0];

/// A reconciled tempo with the provenance of the decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub bpm: i32,
    pub method: String,
}

/// Resolve two raw tempo estimates against a trusted anchor tempo.
///
/// Estimate A is the energy-flux estimate and always present; estimate B is
/// the onset-interval estimate and may be 0 (unavailable). Both are subject
/// to octave errors, so after the direct-tolerance checks the candidate set
/// is each estimate multiplied and divided by 1, 2, 3; the candidate closest
/// to the anchor wins, ties going to the earliest generated (A before B,
/// ascending factor).
pub fn reconcile(estimate_a: f64, estimate_b: f64, anchor_bpm: f64) -> Reconciled {
    if (estimate_a - anchor_bpm).abs() <= TOLERANCE {
        return Reconciled {
            bpm: estimate_a.round() as i32,
            method: "Energy (direct)".to_string(),
        };
    }
    if estimate_b > 0.0 && (estimate_b - anchor_bpm).abs() <= TOLERANCE {
        return Reconciled {
            bpm: estimate_b.round() as i32,
            method: "Onset (direct)".to_string(),
        };
    }

    let mut candidates: Vec<(f64, String)> = Vec::new();
    for factor in FACTORS {
        candidates.push((estimate_a * factor, format!("Energy x{factor}")));
        candidates.push((estimate_a / factor, format!("Energy /{factor}")));
    }
    if estimate_b > 0.0 {
        for factor in FACTORS {
            candidates.push((estimate_b * factor, format!("Onset x{factor}")));
            candidates.push((estimate_b / factor, format!("Onset /{factor}")));
        }
    }

    // Strict `<` keeps the first candidate on ties.
    let mut best = &candidates[0];
    for candidate in &candidates[1..] {
        if (candidate.0 - anchor_bpm).abs() < (best.0 - anchor_bpm).abs() {
            best = candidate;
        }
    }

    Reconciled {
        bpm: best.0.round() as i32,
        method: best.1.clone(),
    }
}

/// No anchor matched: use estimate A verbatim, labeled as a fallback.
pub fn fallback(estimate_a: f64) -> Reconciled {
    Reconciled {
        bpm: estimate_a.round() as i32,
        method: "Energy (fallback)".to_string(),
    }
}

/// Plausibility gate applied before any tag write.
pub fn is_plausible(bpm: i32) -> bool {
    (BPM_LIMITS.0..=BPM_LIMITS.1).contains(&bpm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_match_on_estimate_a() {
        // Within tolerance 4 of the anchor: no candidate search.
        let r = reconcile(128.0, 64.0, 130.0);
        assert_eq!(r.bpm, 128);
        assert_eq!(r.method, "Energy (direct)");
    }

    #[test]
    fn direct_match_on_estimate_b() {
        let r = reconcile(70.0, 138.0, 140.0);
        assert_eq!(r.bpm, 138);
        assert_eq!(r.method, "Onset (direct)");
    }

    #[test]
    fn octave_doubling_resolves_half_tempo() {
        // 70 x2 hits the anchor exactly; beats every other candidate.
        let r = reconcile(70.0, 0.0, 140.0);
        assert_eq!(r.bpm, 140);
        assert_eq!(r.method, "Energy x2");
    }

    #[test]
    fn division_resolves_double_tempo() {
        let r = reconcile(180.0, 0.0, 90.0);
        assert_eq!(r.bpm, 90);
        assert_eq!(r.method, "Energy /2");
    }

    #[test]
    fn ties_go_to_earliest_candidate() {
        // A x1 and A /1 are identical values; the first generated wins.
        let r = reconcile(100.0, 0.0, 100.1);
        assert_eq!(r.bpm, 100);
        assert_eq!(r.method, "Energy (direct)");

        // Force a genuine tie between A and B candidates: A=60, B=30,
        // anchor=120 -> A x2 = 120 and B x... B x2=60, B x3=90; A x2 is
        // the unique closest, but A x2 vs B would tie if B=60. Check that.
        let r = reconcile(200.0, 60.0, 120.0);
        // A: 200,100,400,66.7,600,50 ; B: 60,120,... B x2 = 120 exact.
        assert_eq!(r.bpm, 120);
        assert_eq!(r.method, "Onset x2");
    }

    #[test]
    fn unavailable_estimate_b_is_skipped() {
        let r = reconcile(70.0, 0.0, 72.0);
        assert_eq!(r.method, "Energy (direct)");

        // B=0 never enters the candidate set even when it would be closest.
        let r = reconcile(200.0, 0.0, 65.0);
        assert_eq!(r.method, "Energy /3");
        assert_eq!(r.bpm, 67);
    }

    #[test]
    fn fallback_uses_estimate_a_verbatim() {
        let r = fallback(123.4);
        assert_eq!(r.bpm, 123);
        assert_eq!(r.method, "Energy (fallback)");
    }

    #[test]
    fn plausibility_bounds_are_inclusive() {
        assert!(is_plausible(40));
        assert!(is_plausible(210));
        assert!(!is_plausible(39));
        assert!(!is_plausible(211));
    }
}
