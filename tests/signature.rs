use hmac::Mac;
use initdata::config::BotToken;
use initdata::signature::{
    derive_secret, expected_signature, parse_payload, sign_fields, signing_string, verify_init_data,
    InitDataVerifier, Rejection, SigningFields,
};

const TOKEN: &str = "TESTBOT123";

/// Independent two-stage HMAC over an already built signing string.
fn reference_hash(token: &str, signing_string: &str) -> String {
    let mut mac = hmac::Hmac::<sha2::Sha256>::new_from_slice(b"WebAppData").unwrap();
    mac.update(token.as_bytes());
    let secret = mac.finalize().into_bytes();

    let mut mac = hmac::Hmac::<sha2::Sha256>::new_from_slice(&secret).unwrap();
    mac.update(signing_string.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn fields(pairs: &[(&str, &str)]) -> SigningFields {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn concrete_scenario_verifies() {
    let hash = reference_hash(TOKEN, "auth_date=1700000000\nuser=Alice");
    let raw = format!("user=Alice&auth_date=1700000000&hash={}", hash);

    let verified = verify_init_data(&raw, &BotToken::new(TOKEN)).unwrap();
    assert_eq!(verified, fields(&[("auth_date", "1700000000"), ("user", "Alice")]));
}

#[test]
fn all_zero_hash_is_mismatch() {
    let raw = format!("user=Alice&auth_date=1700000000&hash={}", "0".repeat(64));
    assert_eq!(verify_init_data(&raw, &BotToken::new(TOKEN)), Err(Rejection::SignatureMismatch));
}

#[test]
fn empty_input_is_malformed() {
    assert_eq!(verify_init_data("", &BotToken::new(TOKEN)), Err(Rejection::MalformedPayload));
    assert_eq!(verify_init_data("&&&", &BotToken::new(TOKEN)), Err(Rejection::MalformedPayload));
}

#[test]
fn payload_without_hash_is_missing_signature() {
    let token = BotToken::new(TOKEN);
    for raw in ["user=Alice", "user=Alice&auth_date=1", "hashish=abc", "x=1&hash=", "note=hash=abc"] {
        assert_eq!(verify_init_data(raw, &token), Err(Rejection::MissingSignature), "{}", raw);
    }
}

#[test]
fn garbage_input_never_panics() {
    let token = BotToken::new(TOKEN);
    for raw in ["=", "==", "%", "%zz=%", "hash", "\u{0}\u{1}&hash=\u{7f}", "&=&hash=&=", "é=ü&hash=💥"] {
        assert!(verify_init_data(raw, &token).is_err(), "{:?}", raw);
    }
}

#[test]
fn tampered_value_is_mismatch() {
    let verifier = InitDataVerifier::new(&BotToken::new(TOKEN));
    let original = fields(&[("auth_date", "1700000000"), ("query_id", "AAHdF6IQ"), ("user", "Alice")]);
    let hash = verifier.sign(&original);

    for (key, value) in &original {
        let mut bytes = value.clone().into_bytes();
        bytes[0] = if bytes[0] == b'x' { b'y' } else { b'x' };
        let mut tampered = original.clone();
        tampered.insert(key.clone(), String::from_utf8(bytes).unwrap());

        let raw = tampered.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join("&");
        let raw = format!("{}&hash={}", raw, hash);
        assert_eq!(verifier.verify(&raw), Err(Rejection::SignatureMismatch), "tampered {}", key);
    }
}

#[test]
fn segment_order_does_not_matter() {
    let hash = reference_hash(TOKEN, "auth_date=1700000000\nquery_id=Q1\nuser=Alice");
    let token = BotToken::new(TOKEN);
    let orders = [
        format!("user=Alice&auth_date=1700000000&query_id=Q1&hash={}", hash),
        format!("hash={}&query_id=Q1&user=Alice&auth_date=1700000000", hash),
        format!("auth_date=1700000000&hash={}&user=Alice&query_id=Q1", hash),
    ];
    for raw in &orders {
        assert!(verify_init_data(raw, &token).is_ok(), "{}", raw);
    }
}

#[test]
fn duplicate_key_keeps_last_value() {
    let hash = reference_hash(TOKEN, "auth_date=1700000000\nuser=Bob");
    let raw = format!("user=Alice&auth_date=1700000000&user=Bob&hash={}", hash);

    let verified = verify_init_data(&raw, &BotToken::new(TOKEN)).unwrap();
    assert_eq!(verified.get("user").map(String::as_str), Some("Bob"));

    // Signed over the first value instead: rejected
    let hash = reference_hash(TOKEN, "auth_date=1700000000\nuser=Alice");
    let raw = format!("user=Alice&auth_date=1700000000&user=Bob&hash={}", hash);
    assert_eq!(verify_init_data(&raw, &BotToken::new(TOKEN)), Err(Rejection::SignatureMismatch));
}

#[test]
fn values_split_on_first_equals_only() {
    let parsed = parse_payload("sig=a=b==&hash=ff").unwrap();
    assert_eq!(parsed.fields.get("sig").map(String::as_str), Some("a=b=="));
    assert_eq!(parsed.claimed_hash, "ff");
}

#[test]
fn percent_encoded_values_are_signed_decoded() {
    let user = r#"{"id":1,"first_name":"Ann"}"#;
    let hash = reference_hash(TOKEN, &format!("auth_date=1700000000\nuser={}", user));
    let raw = format!(
        "auth_date=1700000000&user=%7B%22id%22%3A1%2C%22first_name%22%3A%22Ann%22%7D&hash={}",
        hash
    );

    let verified = verify_init_data(&raw, &BotToken::new(TOKEN)).unwrap();
    assert_eq!(verified.get("user").map(String::as_str), Some(user));
}

#[test]
fn uppercase_hash_is_accepted() {
    let hash = reference_hash(TOKEN, "auth_date=1700000000\nuser=Alice").to_uppercase();
    let raw = format!("user=Alice&auth_date=1700000000&hash={}", hash);
    assert!(verify_init_data(&raw, &BotToken::new(TOKEN)).is_ok());
}

#[test]
fn non_hex_or_truncated_hash_is_mismatch() {
    let token = BotToken::new(TOKEN);
    let hash = reference_hash(TOKEN, "user=Alice");
    let too_long = format!("{}00", hash);
    for claimed in ["not-hex", &hash[..62], too_long.as_str()] {
        let raw = format!("user=Alice&hash={}", claimed);
        assert_eq!(verify_init_data(&raw, &token), Err(Rejection::SignatureMismatch), "{}", claimed);
    }
}

#[test]
fn hash_only_payload_signs_empty_string() {
    let hash = reference_hash(TOKEN, "");
    let verified = verify_init_data(&format!("hash={}", hash), &BotToken::new(TOKEN)).unwrap();
    assert!(verified.is_empty());
}

#[test]
fn wrong_token_is_mismatch() {
    let hash = reference_hash(TOKEN, "user=Alice");
    let raw = format!("user=Alice&hash={}", hash);
    assert_eq!(verify_init_data(&raw, &BotToken::new("OTHERBOT")), Err(Rejection::SignatureMismatch));
}

#[test]
fn signing_string_is_sorted_newline_joined() {
    let f = fields(&[("user", "Alice"), ("auth_date", "1"), ("Zed", "z")]);
    assert_eq!(signing_string(&f), "Zed=z\nauth_date=1\nuser=Alice");
    assert_eq!(signing_string(&SigningFields::new()), "");
}

#[test]
fn expected_signature_matches_reference() {
    let secret = derive_secret(&BotToken::new(TOKEN));
    let sig = expected_signature(&secret, "auth_date=1700000000\nuser=Alice");
    assert_eq!(sig, reference_hash(TOKEN, "auth_date=1700000000\nuser=Alice"));
    assert_eq!(sig.len(), 64);
    assert!(sig.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
}

#[test]
fn signed_payload_round_trips_through_verify() {
    let verifier = InitDataVerifier::new(&BotToken::new(TOKEN));
    let original = fields(&[("auth_date", "1700000000"), ("user", r#"{"id":5,"first_name":"A & B"}"#)]);
    let raw = verifier.signed_payload(&original);
    assert_eq!(verifier.verify(&raw).unwrap(), original);
}

#[test]
fn secrets_are_not_printed() {
    let token = BotToken::new(TOKEN);
    assert!(!format!("{:?}", token).contains(TOKEN));
    assert!(!format!("{:?}", InitDataVerifier::new(&token)).contains(TOKEN));
}

#[test]
fn sign_fields_produces_verifiable_payload() {
    let token = BotToken::new(TOKEN);
    let original = fields(&[("auth_date", "1700000000"), ("query_id", "Q 1+2"), ("user", "Alice")]);
    let raw = sign_fields(&token, &original);

    assert!(raw.ends_with(&format!("&hash={}", reference_hash(TOKEN, &signing_string(&original)))));
    assert_eq!(verify_init_data(&raw, &token).unwrap(), original);
}

#[test]
fn invalid_utf8_escapes_are_malformed() {
    let token = BotToken::new(TOKEN);
    let hash = reference_hash(TOKEN, "x=\u{FFFD}");
    for raw in [format!("x=%FF&hash={}", hash), format!("x=%C0&hash={}", hash), format!("%FF=1&hash={}", hash)] {
        assert_eq!(verify_init_data(&raw, &token), Err(Rejection::MalformedPayload), "{}", raw);
    }

    // A genuinely encoded replacement character is ordinary text
    let raw = format!("x=%EF%BF%BD&hash={}", hash);
    assert_eq!(verify_init_data(&raw, &token).unwrap(), fields(&[("x", "\u{FFFD}")]));
}

#[test]
fn plus_decodes_to_space() {
    let hash = reference_hash(TOKEN, "q=a b");
    let parsed = parse_payload(&format!("q=a+b&hash={}", hash)).unwrap();
    assert_eq!(parsed.fields.get("q").map(String::as_str), Some("a b"));
    assert!(verify_init_data(&format!("q=a%20b&hash={}", hash), &BotToken::new(TOKEN)).is_ok());
}
