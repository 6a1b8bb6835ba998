use funcspec_core::ir::{Constant, Operand};
use funcspec_core::SpecializerConfig;
use funcspec_test_helpers::{
    branch_module, call_arg, callees, clone_names, function_pointer_module, literal_config,
    recursive_module, specialize, two_globals_module,
};

#[test]
fn test_two_constant_globals_get_one_clone_each() {
    let mut m = two_globals_module(100);
    let report = specialize(&mut m, &SpecializerConfig::default());

    assert!(report.changed);
    assert_eq!(report.clones_created, 2);
    assert_eq!(
        callees(&m, "main"),
        vec!["f.specialized.1", "f.specialized.2"]
    );
    assert_eq!(report.functions_removed, vec!["f".to_string()]);
    assert!(m.function_by_name("f").is_none());

    let a = m.global_by_name("a").unwrap();
    let b = m.global_by_name("b").unwrap();
    assert_eq!(call_arg(&m, "main", 0, 0), Some(Operand::Const(Constant::global(a))));
    assert_eq!(call_arg(&m, "main", 1, 0), Some(Operand::Const(Constant::global(b))));
}

#[test]
fn test_small_function_is_left_alone() {
    let mut m = two_globals_module(0);
    let report = specialize(&mut m, &SpecializerConfig::default());
    assert!(!report.changed);
    assert_eq!(report.clones_created, 0);
    assert_eq!(callees(&m, "main"), vec!["f", "f"]);
}

#[test]
fn test_second_run_finds_nothing() {
    let mut m = two_globals_module(100);
    let first = specialize(&mut m, &SpecializerConfig::default());
    assert_eq!(first.clones_created, 2);

    let second = specialize(&mut m, &SpecializerConfig::default());
    assert!(!second.changed);
    assert_eq!(second.clones_created, 0);
    assert_eq!(clone_names(&m), vec!["f.specialized.1", "f.specialized.2"]);
}

#[test]
fn test_function_pointer_argument_earns_inlining_bonus() {
    // `g` alone is worth nothing to fold; only the promoted indirect call
    // makes the clone profitable.
    let mut m = function_pointer_module(true);
    let report = specialize(&mut m, &literal_config());
    assert_eq!(report.clones_created, 1);
    assert_eq!(callees(&m, "main"), vec!["g.specialized.1"]);
    assert_eq!(callees(&m, "g.specialized.1"), vec!["<indirect>"]);
    // `g` is external and keeps its body.
    assert!(m.function_by_name("g").is_some());
    assert!(report.functions_removed.is_empty());
}

#[test]
fn test_mismatched_function_pointer_earns_nothing() {
    let mut m = function_pointer_module(false);
    let report = specialize(&mut m, &literal_config());
    assert_eq!(report.clones_created, 0);
    assert_eq!(callees(&m, "main"), vec!["g"]);
}

#[test]
fn test_branch_specializations_print() {
    let mut m = branch_module(&[5, 6]);
    let report = specialize(&mut m, &literal_config());
    assert_eq!(report.clones_created, 2);
    insta::assert_snapshot!(m.to_string(), @r#"
    ; module branch

    define void @main() {
    entry:
      %0 = call i32 @f.specialized.1(i32 5)
      %1 = call i32 @f.specialized.2(i32 6)
      ret void
    }

    define internal i32 @f.specialized.1(i32 %n) {
    entry: ; count 1
      %0 = icmp eq i32 %n, 5
      br i1 %0, label %then, label %else
    then: ; count 100
      %2 = add i32 %n, 1
      %3 = add i32 %2, 1
      ret i32 %3
    else: ; count 100
      %5 = mul i32 %n, 3
      ret i32 %5
    }

    define internal i32 @f.specialized.2(i32 %n) {
    entry: ; count 1
      %0 = icmp eq i32 %n, 5
      br i1 %0, label %then, label %else
    then: ; count 100
      %2 = add i32 %n, 1
      %3 = add i32 %2, 1
      ret i32 %3
    else: ; count 100
      %5 = mul i32 %n, 3
      ret i32 %5
    }
    "#);
}

#[test]
fn test_equal_signatures_share_a_clone() {
    let mut m = branch_module(&[5, 6, 5]);
    let report = specialize(&mut m, &literal_config());
    assert_eq!(report.clones_created, 2);
    assert_eq!(
        callees(&m, "main"),
        vec!["f.specialized.1", "f.specialized.2", "f.specialized.1"]
    );
}

#[test]
fn test_clone_budget_is_respected() {
    let mut m = branch_module(&[5, 6, 7, 8]);
    let config = SpecializerConfig {
        max_clones: 1,
        ..literal_config()
    };
    let report = specialize(&mut m, &config);
    assert_eq!(report.clones_created, 1);
    assert!(report.functions_removed.is_empty());

    let targets = callees(&m, "main");
    assert_eq!(targets.iter().filter(|t| *t == "f.specialized.1").count(), 1);
    assert_eq!(targets.iter().filter(|t| *t == "f").count(), 3);
}

#[test]
fn test_redirected_calls_pass_the_bound_constants() {
    let mut m = branch_module(&[5, 6, 5, 7, 6]);
    specialize(&mut m, &literal_config());
    let targets = callees(&m, "main");
    for clone in clone_names(&m) {
        let actuals: Vec<Operand> = targets
            .iter()
            .enumerate()
            .filter(|(_, t)| **t == clone)
            .filter_map(|(i, _)| call_arg(&m, "main", i, 0))
            .collect();
        assert!(!actuals.is_empty(), "{} has no callers", clone);
        assert!(
            actuals.windows(2).all(|w| w[0] == w[1]),
            "{} called with {:?}",
            clone,
            actuals
        );
    }
}

#[test]
fn test_removed_functions_have_no_callers_left() {
    let mut m = branch_module(&[5, 6]);
    let report = specialize(&mut m, &literal_config());
    assert_eq!(report.functions_removed, vec!["f".to_string()]);
    for (_, f) in m.functions() {
        assert!(!callees(&m, &f.name).iter().any(|c| c == "f" || c == "<erased>"));
    }
}

#[test]
fn test_recursive_function_needs_promotion_to_progress() {
    let config = SpecializerConfig {
        force_specialization: true,
        max_iterations: 1,
        ..SpecializerConfig::default()
    };
    let mut m = recursive_module();
    let report = specialize(&mut m, &config);
    assert_eq!(report.iterations, 1);
    assert_eq!(report.clones_created, 1);
    assert_eq!(report.promoted_constants, 1);

    let promoted = m.global_by_name("funcspec.arg.1").unwrap();
    assert!(m.global(promoted).is_constant);
    assert_eq!(m.global(promoted).initializer, Some(Constant::i32(2)));
    assert_eq!(callees(&m, "main"), vec!["rec.specialized.1"]);
    assert_eq!(callees(&m, "rec.specialized.1"), vec!["rec"]);
    assert_eq!(
        call_arg(&m, "rec.specialized.1", 0, 0),
        Some(Operand::Const(Constant::global(promoted)))
    );
}

#[test]
fn test_recursive_function_specializes_on_promoted_constant() {
    let config = SpecializerConfig {
        force_specialization: true,
        max_iterations: 2,
        ..SpecializerConfig::default()
    };
    let mut m = recursive_module();
    let report = specialize(&mut m, &config);
    assert_eq!(report.iterations, 2);
    assert_eq!(report.clones_created, 2);
    assert_eq!(report.promoted_constants, 2);

    assert_eq!(callees(&m, "main"), vec!["rec.specialized.1"]);
    assert_eq!(callees(&m, "rec.specialized.1"), vec!["rec.specialized.2"]);
    assert_eq!(callees(&m, "rec.specialized.2"), vec!["rec"]);

    let second = m.global_by_name("funcspec.arg.2").unwrap();
    assert_eq!(m.global(second).initializer, Some(Constant::i32(3)));
    // The original still serves its own recursion and the deepest clone.
    assert!(m.function_by_name("rec").is_some());
}
