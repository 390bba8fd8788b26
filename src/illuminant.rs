//! EXIF LightSource identifiers used by DNG calibration tags.

/// Known calibration illuminant with its nominal temperature.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IlluminantInfo {
    pub id: u16,
    pub name: &'static str,
    pub cct: f64,
}

const TABLE: &[(u16, &str, Option<f64>)] = &[
    (0, "Unknown", None),
    (1, "Daylight", Some(5500.0)),
    (2, "Fluorescent", Some(4200.0)),
    (3, "Tungsten", Some(2850.0)),
    (4, "Flash", Some(6000.0)),
    (9, "Fine Weather", Some(5500.0)),
    (10, "Cloudy", Some(6500.0)),
    (11, "Shade", Some(7500.0)),
    (12, "Daylight Fluorescent", Some(6500.0)),
    (13, "Day White Fluorescent", Some(7000.0)),
    (14, "Cool White Fluorescent", Some(4200.0)),
    (15, "White Fluorescent", Some(3500.0)),
    (16, "Warm White Fluorescent", Some(3000.0)),
    (17, "Standard Light A", Some(2856.0)),
    (18, "Standard Light B", Some(4874.0)),
    (19, "Standard Light C", Some(6774.0)),
    (20, "D55", Some(5500.0)),
    (21, "D65", Some(6504.0)),
    (22, "D75", Some(7500.0)),
    (23, "D50", Some(5003.0)),
    (24, "ISO Studio Tungsten", Some(3200.0)),
    (255, "Other", None),
];

/// Looks up an illuminant id; `Unknown`, `Other` and unlisted ids yield `None`.
pub fn lookup(id: u16) -> Option<IlluminantInfo> {
    TABLE
        .iter()
        .find(|(table_id, _, _)| *table_id == id)
        .and_then(|&(id, name, cct)| cct.map(|cct| IlluminantInfo { id, name, cct }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known() {
        let a = lookup(17).unwrap();
        assert_eq!(a.name, "Standard Light A");
        assert_eq!(a.cct, 2856.0);
        assert_eq!(lookup(21).unwrap().cct, 6504.0);
    }

    #[test]
    fn test_lookup_excludes_unmapped() {
        assert!(lookup(0).is_none());
        assert!(lookup(255).is_none());
        assert!(lookup(5).is_none());
    }
}
