// Property tests for the envelope, token material, and constraint rules

use std::collections::HashMap;

use proptest::prelude::*;

use gatehouse::auth::tokens::{generate_opaque_token, PasswordHasher, Sha256Hasher};
use gatehouse::core::models::Role;
use gatehouse::store::unique_constraint;
use gatehouse::{Outcome, User};

proptest! {
    #[test]
    fn prop_failure_never_carries_payload(message in ".{0,64}") {
        let outcome: Outcome<u32> = Outcome::fail(message);
        prop_assert!(!outcome.is_success());
        prop_assert!(outcome.value().is_none());
    }

    #[test]
    fn prop_has_error_iff_lists_nonempty(
        errors in proptest::collection::vec(".{1,16}", 0..4),
        codes in proptest::collection::vec("[a-z_]{1,16}", 0..4),
    ) {
        let outcome: Outcome<()> = Outcome::fail_with("bad".to_string(), codes.clone(), errors.clone());
        prop_assert_eq!(outcome.has_error(), !codes.is_empty() || !errors.is_empty());
        prop_assert_eq!(outcome.error_codes(), codes.as_slice());
        prop_assert_eq!(outcome.errors(), errors.as_slice());
    }

    #[test]
    fn prop_coded_errors_stay_parallel(pairs in proptest::collection::vec(("[a-z_]{1,12}", ".{1,24}"), 1..6)) {
        let mut outcome: Outcome<()> = Outcome::fail("bad");
        for (code, error) in &pairs {
            outcome.add_error_coded(error.clone(), code.clone());
        }
        prop_assert_eq!(outcome.error_codes().len(), outcome.errors().len());
        prop_assert_eq!(outcome.error_codes().len(), pairs.len());
    }

    #[test]
    fn prop_envelope_survives_serialization(
        message in ".{0,64}",
        errors in proptest::collection::vec(".{1,16}", 0..4),
    ) {
        let mut outcome: Outcome<u32> = Outcome::fail(message);
        for error in &errors {
            outcome.add_error(error.clone());
        }
        let json = serde_json::to_string(&outcome).unwrap();
        let back: Outcome<u32> = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back.is_success(), outcome.is_success());
        prop_assert_eq!(back.message(), outcome.message());
        prop_assert_eq!(back.errors(), outcome.errors());
    }

    #[test]
    fn prop_hasher_round_trips(password in ".{1,48}", other in ".{1,48}") {
        let hasher = Sha256Hasher;
        let hashed = hasher.hash(&password).unwrap();
        prop_assert!(hasher.verify(&password, &hashed));
        if other != password {
            prop_assert!(!hasher.verify(&other, &hashed));
        }
    }

    #[test]
    fn prop_constraint_ignores_own_row(email in "[a-z]{1,12}@[a-z]{1,8}\\.com") {
        let constraint = unique_constraint(
            "email",
            |u: &User| Some(u.email_lower.clone()),
            |u: &User| u.is_active,
        );
        let user = User::create("n", "u", email, "h", None, Role::Standard, 0);
        let mut rows = HashMap::new();
        rows.insert(user.id, user.clone());
        // Re-inserting the same row (an update) never clashes with itself
        prop_assert!(constraint(&user, &rows).is_ok());
    }

    #[test]
    fn prop_constraint_rejects_duplicate_key(email in "[a-z]{1,12}@[a-z]{1,8}\\.com") {
        let constraint = unique_constraint(
            "email",
            |u: &User| Some(u.email_lower.clone()),
            |u: &User| u.is_active,
        );
        let existing = User::create("n", "u1", email.clone(), "h", None, Role::Standard, 0);
        let candidate = User::create("n", "u2", email, "h", None, Role::Standard, 0);
        let mut rows = HashMap::new();
        rows.insert(existing.id, existing);
        prop_assert!(constraint(&candidate, &rows).is_err());
    }
}

#[test]
fn test_opaque_tokens_decode_to_64_bytes() {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    for _ in 0..32 {
        let token = generate_opaque_token();
        let bytes = STANDARD.decode(&token).unwrap();
        assert_eq!(bytes.len(), 64);
    }
}
