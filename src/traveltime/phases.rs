//! Phase group bookkeeping for soft matching during identification.

/// Phases considered regional (crustal or uppermost-mantle paths).
const REGIONAL_PHASES: [&str; 8] = ["Pn", "Pb", "Pg", "Sn", "Sb", "Sg", "Lg", "LR"];

/// Phase group of a code: the equivalence class used when an observed and
/// a theoretical phase don't match exactly. Unknown codes fall into the
/// "Any" group, which matches everything.
pub fn group_of(phase: &str) -> &'static str {
    match phase {
        "P" | "Pb" | "Pg" | "Pn" | "Pdif" | "pP" | "sP" => "P",
        "PKP" | "PKPab" | "PKPbc" | "PKPdf" | "PKiKP" => "PKP",
        "S" | "Sb" | "Sg" | "Sn" | "Sdif" | "sS" | "pS" => "S",
        "SKS" | "SKSac" | "SKSdf" => "SKS",
        "PcP" => "PcP",
        "ScS" => "ScS",
        "Lg" => "Lg",
        "LR" => "LR",
        _ => "Any",
    }
}

/// Auxiliary group of a primary group: a generic P could equally be a
/// PKP at the right distance, and likewise for S.
pub fn aux_group_of(group: &str) -> Option<&'static str> {
    match group {
        "P" => Some("PKP"),
        "S" => Some("SKS"),
        _ => None,
    }
}

/// True for the primary crust/mantle groups whose generic codes get the
/// auxiliary-group treatment.
pub fn is_primary(group: &str) -> bool {
    matches!(group, "P" | "S")
}

pub fn is_regional(phase: &str) -> bool {
    REGIONAL_PHASES.contains(&phase)
}

/// Group of an observed phase code. Contributed automatic picks from
/// regional networks are assumed regional: their crustal codes map to the
/// special "Reg" group.
pub fn find_group(phase: &str, contributed_auto: bool) -> &'static str {
    if contributed_auto && is_regional(phase) {
        return "Reg";
    }
    group_of(phase)
}

/// A generic code names its own group (a bare "P" rather than a "Pn").
pub fn is_generic(phase: &str, group: &str) -> bool {
    group == "Any" || phase == group
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crustal_p_phases_share_a_group() {
        assert_eq!(group_of("Pn"), "P");
        assert_eq!(group_of("Pg"), "P");
        assert_eq!(group_of("P"), "P");
        assert_ne!(group_of("PKPdf"), "P");
    }

    #[test]
    fn generic_codes_name_their_group() {
        assert!(is_generic("P", group_of("P")));
        assert!(!is_generic("Pn", group_of("Pn")));
        assert!(is_generic("xyz", group_of("xyz")));
    }

    #[test]
    fn contributed_automatics_map_to_regional() {
        assert_eq!(find_group("Pg", true), "Reg");
        assert_eq!(find_group("Pg", false), "P");
        assert_eq!(find_group("PKPdf", true), "PKP");
    }

    #[test]
    fn primary_groups_have_aux_groups() {
        assert_eq!(aux_group_of("P"), Some("PKP"));
        assert_eq!(aux_group_of("S"), Some("SKS"));
        assert_eq!(aux_group_of("Lg"), None);
        assert!(is_primary("P"));
        assert!(!is_primary("Lg"));
    }
}
