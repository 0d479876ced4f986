#![cfg(feature = "serde")]

use component_core::{EventName, RunLocation, TargetId, TargetKind};

#[test]
fn test_keys_serialize_as_plain_values() {
    assert_eq!(
        serde_json::to_string(&EventName::BLOCK_GRID_CHANGE).unwrap(),
        "\"BlockGridChange\""
    );
    assert_eq!(serde_json::to_string(&TargetId(7)).unwrap(), "7");

    let kind: TargetKind = serde_json::from_str("\"Grid\"").unwrap();
    assert_eq!(kind, TargetKind::Grid);

    let json = serde_json::to_string(&RunLocation::SERVER).unwrap();
    let back: RunLocation = serde_json::from_str(&json).unwrap();
    assert_eq!(back, RunLocation::SERVER);
}
