use toml_codec::{parse, Datetime, DatetimeKind, ErrorKind, Integer, Table, Value, MAX_DEPTH};

fn get<'a>(doc: &'a Table, path: &[&str]) -> &'a Value {
    doc.get_path(path)
        .unwrap_or_else(|| panic!("missing {path:?} in {doc:?}"))
}

fn parse_value(literal: &str) -> Value {
    let doc = parse(&format!("v = {literal}\n")).unwrap();
    get(&doc, &["v"]).clone()
}

fn error_kind(text: &str) -> ErrorKind {
    parse(text)
        .map(|doc| panic!("expected {text:?} to fail, got {doc:?}"))
        .unwrap_err()
        .kind()
}

// ============================================================================
// Top level
// ============================================================================

#[test]
fn parse_empty_document() {
    assert!(parse("").unwrap().is_empty());
    assert!(parse("\n\n  \t\n").unwrap().is_empty());
    assert!(parse("# only a comment").unwrap().is_empty());
}

#[test]
fn parse_end_to_end_example() {
    let doc = parse("name = \"ccjk\"\n[server]\nhost = \"localhost\"\nport = 8080\n").unwrap();
    assert_eq!(get(&doc, &["name"]).as_str(), Some("ccjk"));
    assert_eq!(get(&doc, &["server", "host"]).as_str(), Some("localhost"));
    assert_eq!(get(&doc, &["server", "port"]).as_integer(), Some(8080));
    assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["name", "server"]);
}

#[test]
fn parse_comments_after_values_and_headers() {
    let doc = parse("a = 1 # one\n[t] # table\nb = 2#two\n").unwrap();
    assert_eq!(get(&doc, &["a"]).as_integer(), Some(1));
    assert_eq!(get(&doc, &["t", "b"]).as_integer(), Some(2));
}

#[test]
fn parse_crlf_line_endings() {
    let doc = parse("a = 1\r\n[t]\r\nb = \"\"\"\r\nx\r\ny\"\"\"\r\n").unwrap();
    assert_eq!(get(&doc, &["a"]).as_integer(), Some(1));
    assert_eq!(get(&doc, &["t", "b"]).as_str(), Some("x\ny"));
}

#[test]
fn parse_rejects_garbage_after_value() {
    assert_eq!(error_kind("a = 1 2\n"), ErrorKind::Lexical);
    assert_eq!(error_kind("a = truex\n"), ErrorKind::Lexical);
    assert_eq!(error_kind("[t] x\n"), ErrorKind::Lexical);
}

#[test]
fn parse_rejects_lone_carriage_return() {
    assert_eq!(error_kind("a = 1\rb = 2"), ErrorKind::Lexical);
}

// ============================================================================
// Keys
// ============================================================================

#[test]
fn parse_bare_quoted_and_dotted_keys() {
    let doc = parse(
        "bare-key_1 = 1\n\"quoted key\" = 2\n'literal.key' = 3\na . b.\"c\" = 4\n\"\" = 5\n",
    )
    .unwrap();
    assert_eq!(get(&doc, &["bare-key_1"]).as_integer(), Some(1));
    assert_eq!(get(&doc, &["quoted key"]).as_integer(), Some(2));
    assert_eq!(get(&doc, &["literal.key"]).as_integer(), Some(3));
    assert_eq!(get(&doc, &["a", "b", "c"]).as_integer(), Some(4));
    assert_eq!(get(&doc, &[""]).as_integer(), Some(5));
}

#[test]
fn parse_digit_keys_are_bare() {
    let doc = parse("1234 = \"x\"\n[2019.v]\nk = 1\n").unwrap();
    assert_eq!(get(&doc, &["1234"]).as_str(), Some("x"));
    assert_eq!(get(&doc, &["2019", "v", "k"]).as_integer(), Some(1));
}

#[test]
fn parse_rejects_missing_equals_and_value() {
    assert_eq!(error_kind("a\n"), ErrorKind::Lexical);
    assert_eq!(error_kind("a =\n"), ErrorKind::Lexical);
    assert_eq!(error_kind("a = "), ErrorKind::Lexical);
    assert_eq!(error_kind("= 1\n"), ErrorKind::Lexical);
}

// ============================================================================
// Strings
// ============================================================================

#[test]
fn parse_basic_string_escapes() {
    let v = parse_value(r#""tab\tnl\nquote\"back\\bs\bff\fcr\r""#);
    assert_eq!(v.as_str(), Some("tab\tnl\nquote\"back\\bs\u{8}ff\u{c}cr\r"));
}

#[test]
fn parse_unicode_escapes() {
    assert_eq!(parse_value(r#""\u00e9""#).as_str(), Some("é"));
    assert_eq!(parse_value(r#""\U0001F600""#).as_str(), Some("😀"));
}

#[test]
fn parse_rejects_surrogate_and_out_of_range_escapes() {
    assert_eq!(error_kind("v = \"\\uD800\"\n"), ErrorKind::Range);
    assert_eq!(error_kind("v = \"\\U00110000\"\n"), ErrorKind::Range);
    assert_eq!(error_kind("v = \"\\u12\"\n"), ErrorKind::Lexical);
    assert_eq!(error_kind("v = \"\\x41\"\n"), ErrorKind::Lexical);
}

#[test]
fn parse_literal_strings_keep_backslashes() {
    assert_eq!(parse_value(r"'C:\Users\nobody'").as_str(), Some(r"C:\Users\nobody"));
    assert_eq!(parse_value("''").as_str(), Some(""));
    assert_eq!(parse_value("\"\"").as_str(), Some(""));
}

#[test]
fn parse_multiline_basic_string() {
    let v = parse_value("\"\"\"\nRoses are red\nViolets are blue\"\"\"");
    assert_eq!(v.as_str(), Some("Roses are red\nViolets are blue"));
    match v {
        Value::String(s) => assert!(s.multiline),
        other => panic!("expected string, got {other:?}"),
    }
}

#[test]
fn parse_multiline_line_ending_backslash() {
    let v = parse_value("\"\"\"\nThe quick \\\n   brown \\   \n\n  fox\"\"\"");
    assert_eq!(v.as_str(), Some("The quick brown fox"));
}

#[test]
fn parse_multiline_quotes_before_delimiter() {
    assert_eq!(parse_value("\"\"\"a \"quote\"\"\"\"\"").as_str(), Some("a \"quote\"\""));
    assert_eq!(parse_value("'''it''s'''").as_str(), Some("it''s"));
    assert_eq!(parse_value("''''x'''''").as_str(), Some("'x''"));
}

#[test]
fn parse_multiline_literal_string() {
    let v = parse_value("'''\nfirst\n  \\second'''");
    assert_eq!(v.as_str(), Some("first\n  \\second"));
}

#[test]
fn parse_rejects_bad_strings() {
    assert_eq!(error_kind("v = \"open\n"), ErrorKind::Lexical);
    assert_eq!(error_kind("v = 'open\n"), ErrorKind::Lexical);
    assert_eq!(error_kind("v = \"\"\"never closed"), ErrorKind::Lexical);
    assert_eq!(error_kind("v = \"bell\u{7}\"\n"), ErrorKind::Lexical);
    assert_eq!(error_kind("# bell\u{7}\n"), ErrorKind::Lexical);
    assert_eq!(error_kind("v = \"\"\"a\"\"\"\"\"\"\n"), ErrorKind::Lexical);
}

// ============================================================================
// Numbers
// ============================================================================

#[test]
fn parse_integers() {
    assert_eq!(parse_value("42").as_integer(), Some(42));
    assert_eq!(parse_value("+17").as_integer(), Some(17));
    assert_eq!(parse_value("-17").as_integer(), Some(-17));
    assert_eq!(parse_value("0").as_integer(), Some(0));
    assert_eq!(parse_value("1_000_000").as_integer(), Some(1_000_000));
    assert_eq!(parse_value("0xDEAD_beef").as_integer(), Some(0xdead_beef));
    assert_eq!(parse_value("0o755").as_integer(), Some(0o755));
    assert_eq!(parse_value("0b1101").as_integer(), Some(0b1101));
}

#[test]
fn parse_integers_beyond_i64_stay_exact() {
    match parse_value("-99999999999999999999") {
        Value::Int(Integer::Wide(w)) => {
            assert!(w.is_negative());
            assert_eq!(w.digits(), "99999999999999999999");
        }
        other => panic!("expected wide integer, got {other:?}"),
    }
    assert_eq!(parse_value("9223372036854775807").as_integer(), Some(i64::MAX));
    assert_eq!(parse_value("-9223372036854775808").as_integer(), Some(i64::MIN));
    match parse_value("0xffffffffffffffff") {
        Value::Int(Integer::Wide(w)) => assert_eq!(w.to_string(), "18446744073709551615"),
        other => panic!("expected wide integer, got {other:?}"),
    }
}

#[test]
fn parse_rejects_malformed_integers() {
    for text in ["v = 01\n", "v = 1__0\n", "v = 1_\n", "v = _1\n", "v = 0x\n", "v = 0x_1\n"] {
        assert_eq!(error_kind(text), ErrorKind::Lexical, "{text:?}");
    }
}

#[test]
fn parse_floats() {
    assert_eq!(parse_value("3.14").as_float(), Some(3.14));
    assert_eq!(parse_value("-0.01").as_float(), Some(-0.01));
    assert_eq!(parse_value("5e+22").as_float(), Some(5e22));
    assert_eq!(parse_value("1E6").as_float(), Some(1e6));
    assert_eq!(parse_value("-2E-2").as_float(), Some(-0.02));
    assert_eq!(parse_value("6.626e-34").as_float(), Some(6.626e-34));
    assert_eq!(parse_value("224_617.445_991").as_float(), Some(224_617.445_991));
    assert_eq!(parse_value("inf").as_float(), Some(f64::INFINITY));
    assert_eq!(parse_value("+inf").as_float(), Some(f64::INFINITY));
    assert_eq!(parse_value("-inf").as_float(), Some(f64::NEG_INFINITY));
    assert!(parse_value("nan").as_float().unwrap().is_nan());
    assert!(parse_value("-nan").as_float().unwrap().is_nan());
    let neg_zero = parse_value("-0.0").as_float().unwrap();
    assert!(neg_zero == 0.0 && neg_zero.is_sign_negative());
}

#[test]
fn parse_rejects_malformed_floats() {
    for text in ["v = 1.\n", "v = .5\n", "v = 1e\n", "v = 1.e5\n", "v = 01.5\n", "v = in\n"] {
        assert_eq!(error_kind(text), ErrorKind::Lexical, "{text:?}");
    }
}

#[test]
fn parse_booleans() {
    assert_eq!(parse_value("true").as_bool(), Some(true));
    assert_eq!(parse_value("false").as_bool(), Some(false));
    assert_eq!(error_kind("v = True\n"), ErrorKind::Lexical);
}

// ============================================================================
// Date/time
// ============================================================================

fn datetime_kind(literal: &str) -> DatetimeKind {
    parse_value(literal).as_datetime().unwrap().kind()
}

#[test]
fn parse_datetime_sub_kinds() {
    assert_eq!(datetime_kind("1979-05-27T07:32:00Z"), DatetimeKind::OffsetDateTime);
    assert_eq!(datetime_kind("1979-05-27T00:32:00-07:00"), DatetimeKind::OffsetDateTime);
    assert_eq!(datetime_kind("1979-05-27T07:32:00"), DatetimeKind::LocalDateTime);
    assert_eq!(datetime_kind("1979-05-27"), DatetimeKind::LocalDate);
    assert_eq!(datetime_kind("07:32:00"), DatetimeKind::LocalTime);
}

#[test]
fn parse_datetime_variants_and_fractions() {
    let v = parse_value("1979-05-27 07:32:00.999999z");
    assert_eq!(
        v.as_datetime().map(ToString::to_string).as_deref(),
        Some("1979-05-27T07:32:00.999999Z")
    );
    let v = parse_value("1979-05-27t07:32:00+05:30");
    assert_eq!(
        v.as_datetime().map(ToString::to_string).as_deref(),
        Some("1979-05-27T07:32:00+05:30")
    );
    let v = parse_value("00:32:00.5");
    assert_eq!(v.as_datetime().map(ToString::to_string).as_deref(), Some("00:32:00.500"));
}

#[test]
fn parse_date_followed_by_comment() {
    let doc = parse("d = 1979-05-27 # birthday\n").unwrap();
    assert!(matches!(get(&doc, &["d"]).as_datetime(), Some(Datetime::Date(_))));
}

#[test]
fn parse_rejects_out_of_range_datetimes() {
    assert_eq!(error_kind("v = 1979-13-01\n"), ErrorKind::Range);
    assert_eq!(error_kind("v = 1979-02-30\n"), ErrorKind::Range);
    assert_eq!(error_kind("v = 25:00:00\n"), ErrorKind::Range);
    assert_eq!(error_kind("v = 1979-05-27T07:32:00+24:00\n"), ErrorKind::Range);
}

#[test]
fn parse_rejects_non_numeric_datetime_components() {
    assert_eq!(error_kind("v = 1979-0a-27\n"), ErrorKind::Range);
    assert_eq!(error_kind("v = 07:3x:00\n"), ErrorKind::Range);
    assert_eq!(error_kind("v = 1979-05-27T07:32:00+0z:00\n"), ErrorKind::Range);
}

#[test]
fn parse_rejects_malformed_datetimes() {
    assert_eq!(error_kind("v = 1979-5-27\n"), ErrorKind::Lexical);
    assert_eq!(error_kind("v = 07:32\n"), ErrorKind::Lexical);
    assert_eq!(error_kind("v = 07:32:00.\n"), ErrorKind::Lexical);
    assert_eq!(error_kind("v = 1979-05-27T07:32:00+07\n"), ErrorKind::Lexical);
}

// ============================================================================
// Inline arrays
// ============================================================================

#[test]
fn parse_inline_arrays() {
    let v = parse_value("[ 1, 2, 3 ]");
    match &v {
        Value::InlineArray(a) => assert_eq!(a.len(), 3),
        other => panic!("expected inline array, got {other:?}"),
    }
    let v = parse_value("[\n  \"a\", # first\n  \"b\",\n]");
    match &v {
        Value::InlineArray(a) => assert_eq!(a.get(1).and_then(Value::as_str), Some("b")),
        other => panic!("expected inline array, got {other:?}"),
    }
    assert!(matches!(parse_value("[]"), Value::InlineArray(a) if a.is_empty()));
}

#[test]
fn parse_nested_arrays_of_different_types() {
    let v = parse_value("[ [1, 2], [\"a\", \"b\"] ]");
    match v {
        Value::InlineArray(a) => assert_eq!(a.len(), 2),
        other => panic!("expected inline array, got {other:?}"),
    }
}

#[test]
fn parse_inline_array_homogeneity() {
    assert_eq!(error_kind("a = [1, \"x\"]\n"), ErrorKind::Semantic);
    assert_eq!(error_kind("a = [1979-05-27, 07:32:00]\n"), ErrorKind::Semantic);
    let doc = parse("a = [1, 2.0]\n").unwrap();
    let expected: Table = vec![(
        "a",
        Value::InlineArray(
            toml_codec::InlineArray::from_values(vec![Value::from(1.0), Value::from(2.0)])
                .unwrap(),
        ),
    )]
    .into_iter()
    .collect();
    assert_eq!(doc, expected);
}

#[test]
fn parse_rejects_malformed_arrays() {
    assert_eq!(error_kind("a = [1 2]\n"), ErrorKind::Lexical);
    assert_eq!(error_kind("a = [,]\n"), ErrorKind::Lexical);
    assert_eq!(error_kind("a = [1,,2]\n"), ErrorKind::Lexical);
    assert_eq!(error_kind("a = [1"), ErrorKind::Lexical);
}

// ============================================================================
// Inline tables
// ============================================================================

#[test]
fn parse_inline_tables() {
    let doc = parse("point = { x = 1, y = 2 }\nempty = {}\nnested = { a.b = 1, c = { d = 2 } }\n")
        .unwrap();
    assert!(matches!(get(&doc, &["point"]), Value::InlineTable(t) if t.len() == 2));
    assert!(matches!(get(&doc, &["empty"]), Value::InlineTable(t) if t.is_empty()));
    assert!(matches!(get(&doc, &["nested", "a"]), Value::InlineTable(_)));
    assert_eq!(get(&doc, &["nested", "a", "b"]).as_integer(), Some(1));
    assert_eq!(get(&doc, &["nested", "c", "d"]).as_integer(), Some(2));
}

#[test]
fn parse_rejects_malformed_inline_tables() {
    assert_eq!(error_kind("t = { a = 1, }\n"), ErrorKind::Lexical);
    assert_eq!(error_kind("t = { a = 1\n}\n"), ErrorKind::Lexical);
    assert_eq!(error_kind("t = { a = 1 b = 2 }\n"), ErrorKind::Lexical);
    assert_eq!(error_kind("t = { a = 1, a = 2 }\n"), ErrorKind::Semantic);
}

#[test]
fn parse_inline_tables_are_closed() {
    assert_eq!(error_kind("t = { a = 1 }\nt.b = 2\n"), ErrorKind::Semantic);
    assert_eq!(error_kind("t = { a = 1 }\n[t]\n"), ErrorKind::Semantic);
    assert_eq!(error_kind("t = { a = 1 }\n[t.sub]\n"), ErrorKind::Semantic);
    assert_eq!(error_kind("t = { a = {} }\nt.a.b = 2\n"), ErrorKind::Semantic);
}

// ============================================================================
// Tables and redefinition
// ============================================================================

#[test]
fn parse_rejects_key_redefinition() {
    assert_eq!(error_kind("a=1\na=2"), ErrorKind::Semantic);
    assert_eq!(error_kind("a = 1\na.b = 2\n"), ErrorKind::Semantic);
    assert_eq!(error_kind("a.b = 1\na.b = 2\n"), ErrorKind::Semantic);
}

#[test]
fn parse_rejects_table_redefinition() {
    assert_eq!(error_kind("[a]\n[a]"), ErrorKind::Semantic);
    assert_eq!(error_kind("[a]\nb = 1\n[a.b]\n"), ErrorKind::Semantic);
    assert_eq!(error_kind("a = 1\n[a]\n"), ErrorKind::Semantic);
}

#[test]
fn parse_header_declares_implicit_table() {
    let doc = parse("[a.b]\n[a]\n[a.c]").unwrap();
    let expected: Table = vec![(
        "a",
        vec![("b", Table::new()), ("c", Table::new())]
            .into_iter()
            .collect::<Table>(),
    )]
    .into_iter()
    .collect();
    assert_eq!(doc, expected);
}

#[test]
fn parse_dotted_keys_cannot_reopen_declared_table() {
    assert_eq!(error_kind("[a.b]\nc = 1\n[a]\nb.d = 2\n"), ErrorKind::Semantic);
}

#[test]
fn parse_dotted_keys_under_header() {
    let doc = parse("[fruit]\napple.color = \"red\"\napple.taste.sweet = true\n").unwrap();
    assert_eq!(get(&doc, &["fruit", "apple", "color"]).as_str(), Some("red"));
    assert_eq!(get(&doc, &["fruit", "apple", "taste", "sweet"]).as_bool(), Some(true));
}

#[test]
fn parse_headers_with_whitespace_and_quotes() {
    let doc = parse("[ a . \"b c\" . 'd' ]\nk = 1\n").unwrap();
    assert_eq!(get(&doc, &["a", "b c", "d", "k"]).as_integer(), Some(1));
}

// ============================================================================
// Arrays of tables
// ============================================================================

#[test]
fn parse_array_of_tables() {
    let doc = parse("[[x]]\na=1\n[[x]]\na=2").unwrap();
    match get(&doc, &["x"]) {
        Value::Array(a) => {
            assert_eq!(a.len(), 2);
            assert_eq!(a.tables()[0].get("a").and_then(Value::as_integer), Some(1));
            assert_eq!(a.tables()[1].get("a").and_then(Value::as_integer), Some(2));
        }
        other => panic!("expected array of tables, got {other:?}"),
    }
}

#[test]
fn parse_subtables_of_array_elements() {
    let doc = parse(
        "[[fruit]]\nname = \"apple\"\n[fruit.physical]\ncolor = \"red\"\n\
         [[fruit.variety]]\nname = \"red delicious\"\n\
         [[fruit]]\nname = \"banana\"\n[[fruit.variety]]\nname = \"plantain\"\n",
    )
    .unwrap();
    let Value::Array(fruit) = get(&doc, &["fruit"]) else {
        panic!("expected array of tables");
    };
    assert_eq!(fruit.len(), 2);
    let apple = &fruit.tables()[0];
    assert_eq!(apple.get_path(&["physical", "color"]).and_then(Value::as_str), Some("red"));
    let banana = &fruit.tables()[1];
    assert!(banana.get("physical").is_none());
    assert!(matches!(banana.get("variety"), Some(Value::Array(v)) if v.len() == 1));
}

#[test]
fn parse_rejects_array_of_tables_conflicts() {
    assert_eq!(error_kind("a = [1]\n[[a]]\n"), ErrorKind::Semantic);
    assert_eq!(error_kind("[a]\n[[a]]\n"), ErrorKind::Semantic);
    assert_eq!(error_kind("[[a]]\n[a]\n"), ErrorKind::Semantic);
    assert_eq!(error_kind("[[a]\n"), ErrorKind::Lexical);
}

// ============================================================================
// Nesting depth
// ============================================================================

fn nested_arrays(depth: usize) -> String {
    format!("a = {}1{}\n", "[".repeat(depth), "]".repeat(depth))
}

#[test]
fn parse_accepts_nesting_up_to_the_limit() {
    let doc = parse(&nested_arrays(MAX_DEPTH - 1)).unwrap();
    let text = toml_codec::stringify(&doc).unwrap();
    assert_eq!(parse(&text).unwrap(), doc);
}

#[test]
fn parse_rejects_deeply_nested_arrays() {
    let err = parse(&nested_arrays(MAX_DEPTH)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Lexical);
    assert!(err.to_string().contains("nested too deeply"));
    assert_eq!(error_kind(&nested_arrays(5_000)), ErrorKind::Lexical);
}

#[test]
fn parse_rejects_deeply_nested_inline_tables() {
    let text = format!("a = {}1{}\n", "{ b = ".repeat(MAX_DEPTH), " }".repeat(MAX_DEPTH));
    assert_eq!(error_kind(&text), ErrorKind::Lexical);
}

#[test]
fn parse_rejects_overlong_dotted_keys_and_headers() {
    let key = vec!["k"; MAX_DEPTH + 1].join(".");
    assert_eq!(error_kind(&format!("{key} = 1\n")), ErrorKind::Lexical);
    assert_eq!(error_kind(&format!("[{key}]\n")), ErrorKind::Lexical);

    let half = vec!["k"; MAX_DEPTH / 2 + 1].join(".");
    assert_eq!(error_kind(&format!("[{half}]\n{half} = 1\n")), ErrorKind::Lexical);
}
