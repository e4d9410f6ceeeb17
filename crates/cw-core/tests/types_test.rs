use cw_core::error::ValidationError;
use cw_core::types::*;

#[test]
fn lifecycle_axis_from_flags() {
    let mut chore = ChoreInstance::new("collect-1", "collect_maturity");
    assert_eq!(chore.lifecycle(), LifecycleState::Stopped);

    chore.enabled = true;
    assert_eq!(chore.lifecycle(), LifecycleState::Running);

    chore.paused = true;
    assert_eq!(chore.lifecycle(), LifecycleState::Paused);

    // A stale paused flag on a disabled chore still reads as stopped.
    chore.enabled = false;
    assert_eq!(chore.lifecycle(), LifecycleState::Stopped);
}

#[test]
fn activity_is_independent_of_enablement() {
    let mut chore = ChoreInstance::new("distribute-1", "distribute_funds");
    assert_eq!(chore.activity(), Activity::Idle);

    chore.conductor_status = ConductorStatus::Running {
        task_id: "t-7".into(),
    };
    assert_eq!(chore.lifecycle(), LifecycleState::Stopped);
    assert_eq!(
        chore.activity(),
        Activity::Running {
            task_id: "t-7".into()
        }
    );

    chore.conductor_status = ConductorStatus::Idle;
    chore.current_task_id = Some("t-8".into());
    assert!(chore.is_active());
}

#[test]
fn display_name_prefers_label() {
    let mut chore = ChoreInstance::new("refresh-stake", "refresh_stake");
    assert_eq!(chore.display_name(), "refresh-stake");
    chore.instance_label = Some(String::new());
    assert_eq!(chore.display_name(), "refresh-stake");
    chore.instance_label = Some("Weekly refresh".into());
    assert_eq!(chore.display_name(), "Weekly refresh");
}

#[test]
fn interval_bounds() {
    assert!(validate_interval(60, None).is_ok());
    assert!(validate_interval(MAX_INTERVAL_SECS, None).is_ok());
    assert!(matches!(
        validate_interval(59, None),
        Err(ValidationError::IntervalTooShort { seconds: 59, .. })
    ));
    assert!(matches!(
        validate_interval(MAX_INTERVAL_SECS + 1, None),
        Err(ValidationError::IntervalTooLong { .. })
    ));
}

#[test]
fn max_interval_must_exceed_interval() {
    assert!(validate_interval(3600, Some(7200)).is_ok());
    assert!(matches!(
        validate_interval(3600, Some(3600)),
        Err(ValidationError::MaxIntervalNotGreater { .. })
    ));
    assert!(matches!(
        validate_interval(3600, Some(60)),
        Err(ValidationError::MaxIntervalNotGreater { .. })
    ));
    assert!(matches!(
        validate_interval(3600, Some(MAX_INTERVAL_SECS + 1)),
        Err(ValidationError::MaxIntervalTooLong { .. })
    ));

    let cfg = ChoreConfig {
        interval_seconds: 120,
        max_interval_seconds: Some(100),
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn principal_parsing() {
    let p = PrincipalId::parse(" ryjl3-tyaaa-aaaaa-aaaba-cai ").expect("valid principal");
    assert_eq!(p.as_str(), "ryjl3-tyaaa-aaaaa-aaaba-cai");
    assert!(PrincipalId::parse("").is_err());
    assert!(PrincipalId::parse("   ").is_err());
    assert!(PrincipalId::parse("Not A Principal").is_err());
    assert!(PrincipalId::parse("-abc").is_err());
}

#[test]
fn subaccount_hex_and_length_checks() {
    let hex = format!("{}01", "00".repeat(31));
    let sub = Subaccount::from_hex(&hex).expect("valid hex");
    assert_eq!(sub.as_bytes()[31], 1);
    assert_eq!(sub.to_hex(), hex);
    assert!(!sub.is_default());

    assert!(Subaccount::from_hex("abcd").is_err());
    assert!(Subaccount::from_hex(&"zz".repeat(32)).is_err());
    assert!(Subaccount::from_slice(&[0u8; 31]).is_err());
    assert!(Subaccount::from_slice(&[0u8; 33]).is_err());
    assert!(Subaccount::from_slice(&[0u8; 32]).unwrap().is_default());
}

#[test]
fn account_display_hides_default_subaccount() {
    let owner = PrincipalId::parse("aaaaa-aa").unwrap();
    let plain = Account::new(owner.clone());
    assert_eq!(plain.to_string(), "aaaaa-aa");

    let zeroed = Account::new(owner.clone()).with_subaccount(Subaccount([0; 32]));
    assert_eq!(zeroed.to_string(), "aaaaa-aa");

    let mut bytes = [0u8; 32];
    bytes[0] = 0xab;
    let sub = Account::new(owner).with_subaccount(Subaccount(bytes));
    assert!(sub.to_string().starts_with("aaaaa-aa.ab00"));
}

#[test]
fn distribution_list_serialization_roundtrip() {
    let list = DistributionList {
        id: 3,
        def: DistributionListDef {
            name: "Treasury split".into(),
            source_subaccount: None,
            token_ledger_id: PrincipalId::parse("ryjl3-tyaaa-aaaaa-aaaba-cai").unwrap(),
            threshold_amount: 100_000_000,
            max_distribution_amount: 1_000_000_000,
            targets: vec![
                DistributionTarget {
                    account: Account::new(PrincipalId::parse("aaaaa-aa").unwrap()),
                    basis_points: Some(7000),
                },
                DistributionTarget {
                    account: Account::new(PrincipalId::parse("2vxsx-fae").unwrap()),
                    basis_points: None,
                },
            ],
        },
    };
    let json = serde_json::to_string(&list).expect("serialize");
    assert!(json.contains("\"id\":3"));
    let back: DistributionList = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, list);
    assert_eq!(back.def.basis_points(), vec![Some(7000), None]);
}
