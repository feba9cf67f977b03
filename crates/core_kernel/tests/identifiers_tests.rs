//! Unit tests for the Identifiers module
//!
//! Tests cover creation, parsing, conversion, ordering and display
//! formatting of the engine's identifier types.

use core_kernel::{DefinitionId, FacilityId, HistoryId, PatientId, SiteId, StaffId, VisitId};
use uuid::Uuid;

mod visit_id_tests {
    use super::*;

    #[test]
    fn test_new_generates_unique_ids() {
        let id1 = VisitId::new();
        let id2 = VisitId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_new_v7_generates_time_ordered_ids() {
        let id1 = VisitId::new_v7();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = VisitId::new_v7();
        assert!(id1 < id2);
    }

    #[test]
    fn test_from_uuid() {
        let uuid = Uuid::new_v4();
        let id = VisitId::from_uuid(uuid);
        assert_eq!(*id.as_uuid(), uuid);
    }

    #[test]
    fn test_from_str_with_prefix() {
        let original = VisitId::new();
        let parsed: VisitId = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_from_str_without_prefix() {
        let uuid = Uuid::new_v4();
        let parsed: VisitId = uuid.to_string().parse().unwrap();
        assert_eq!(*parsed.as_uuid(), uuid);
    }

    #[test]
    fn test_from_str_invalid() {
        let result: Result<VisitId, _> = "VIS-not-a-uuid".parse();
        assert!(result.is_err());
    }
}

mod prefixes {
    use super::*;

    #[test]
    fn test_all_prefixes() {
        assert_eq!(VisitId::prefix(), "VIS");
        assert_eq!(PatientId::prefix(), "PAT");
        assert_eq!(FacilityId::prefix(), "FAC");
        assert_eq!(StaffId::prefix(), "STF");
        assert_eq!(SiteId::prefix(), "SITE");
        assert_eq!(DefinitionId::prefix(), "BON");
        assert_eq!(HistoryId::prefix(), "BHS");
    }

    #[test]
    fn test_display_uses_prefix() {
        assert!(PatientId::new().to_string().starts_with("PAT-"));
        assert!(HistoryId::new().to_string().starts_with("BHS-"));
    }
}

mod serialization {
    use super::*;

    #[test]
    fn test_serializes_as_bare_uuid() {
        let uuid = Uuid::new_v4();
        let id = DefinitionId::from_uuid(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", uuid));
    }

    #[test]
    fn test_sorting_is_deterministic() {
        let mut ids = vec![
            DefinitionId::from_uuid(Uuid::from_u128(3)),
            DefinitionId::from_uuid(Uuid::from_u128(1)),
            DefinitionId::from_uuid(Uuid::from_u128(2)),
        ];
        ids.sort();
        assert_eq!(ids[0], DefinitionId::from_uuid(Uuid::from_u128(1)));
        assert_eq!(ids[2], DefinitionId::from_uuid(Uuid::from_u128(3)));
    }
}
