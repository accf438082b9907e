use serde_json::{json, Value};
use tabulator::reshape::{flatten, AggregationRecord, CollisionPolicy};
use tabulator::{to_table, LabelMap, PivotSpec, Scalar, TabulatorError, TableReshaper};

fn text(s: &str) -> Scalar {
    Scalar::Text(s.to_string())
}

fn speed_severity_records() -> Vec<Value> {
    vec![
        json!({"_id": {"Speed_limit": 30, "Severity": 1}, "count": 10}),
        json!({"_id": {"Speed_limit": 30, "Severity": 2}, "count": 4}),
        json!({"_id": {"Speed_limit": 40, "Severity": 1}, "count": 7}),
    ]
}

#[test]
fn empty_input_gives_empty_table() {
    let table = to_table(&[], &PivotSpec::new("row", "col", "value").fill(0i64), &LabelMap::new()).unwrap();
    assert_eq!(table.shape(), (0, 0));
    assert!(table.row_keys().is_empty());
    assert!(table.column_keys().is_empty());
}

#[test]
fn flattening_a_flat_record_changes_nothing() {
    let record = AggregationRecord::from_json(&json!({"row": "A", "col": "X", "value": 5.5}), 0).unwrap();
    for policy in [CollisionPolicy::FirstWins, CollisionPolicy::LastWins, CollisionPolicy::Reject] {
        let flat = flatten(&record, policy, 0).unwrap();
        assert_eq!(AggregationRecord::from(flat), record);
    }
}

#[test]
fn unique_pairs_round_trip() {
    let records = vec![
        json!({"row": "A", "col": "X", "value": 1}),
        json!({"row": "A", "col": "Y", "value": 2.5}),
        json!({"row": "B", "col": "Y", "value": "three"}),
        json!({"row": "C", "col": "Z", "value": null}),
    ];
    let table = to_table(&records, &PivotSpec::new("row", "col", "value"), &LabelMap::new()).unwrap();

    for record in &records {
        let row = Scalar::from_json(&record["row"]).unwrap();
        let col = Scalar::from_json(&record["col"]).unwrap();
        let value = Scalar::from_json(&record["value"]).unwrap();
        assert_eq!(table.get(&row, &col), Some(&value));
    }
    // (B, X) was never observed and there is no fill value.
    assert_eq!(table.get(&text("B"), &text("X")), None);
}

#[test]
fn fill_value_covers_missing_combinations() {
    let records = vec![
        json!({"row": "A", "col": "X", "value": 5}),
        json!({"row": "B", "col": "Y", "value": 6}),
    ];
    let spec = PivotSpec::new("row", "col", "value").fill(0i64);
    let table = to_table(&records[..1], &spec, &LabelMap::new()).unwrap();
    assert_eq!(table.shape(), (1, 1));

    // Rows {A, B} and columns {X, Y}, with only (A, X) and (B, Y) present.
    let table = to_table(&records, &spec, &LabelMap::new()).unwrap();
    assert_eq!(table.get(&text("A"), &text("X")), Some(&Scalar::Int(5)));
    assert_eq!(table.get(&text("A"), &text("Y")), Some(&Scalar::Int(0)));
    assert_eq!(table.get(&text("B"), &text("X")), Some(&Scalar::Int(0)));
    assert_eq!(table.get(&text("B"), &text("Y")), Some(&Scalar::Int(6)));
}

#[test]
fn fill_scenario_with_single_record() {
    // Rows {A, B}, columns {X, Y}, only (A, X, 5) carries a value.
    let records = vec![
        json!({"row": "A", "col": "X", "value": 5}),
        json!({"row": "B", "col": "Y", "value": null}),
    ];
    let spec = PivotSpec::new("row", "col", "value").fill(0i64);
    let table = to_table(&records, &spec, &LabelMap::new()).unwrap();

    assert_eq!(table.get(&text("A"), &text("X")), Some(&Scalar::Int(5)));
    assert_eq!(table.get(&text("A"), &text("Y")), Some(&Scalar::Int(0)));
    assert_eq!(table.get(&text("B"), &text("X")), Some(&Scalar::Int(0)));
    // An explicit null from the input is a value, not a gap.
    assert_eq!(table.get(&text("B"), &text("Y")), Some(&Scalar::Null));
}

#[test]
fn missing_value_field_fails_without_a_table() {
    let mut records = speed_severity_records();
    records.push(json!({"_id": {"Speed_limit": 50, "Severity": 3}}));

    let spec = PivotSpec::new("Speed_limit", "Severity", "count").fill(0i64);
    match to_table(&records, &spec, &LabelMap::new()) {
        Err(TabulatorError::MissingField { field, record }) => {
            assert_eq!(field, "count");
            assert_eq!(record, 3);
        }
        other => panic!("expected MissingField, got {:?}", other),
    }
}

#[test]
fn unknown_row_label_fails() {
    let labels = LabelMap::new().with("Speed_limit", 30i64, "Urban");
    let spec = PivotSpec::new("Speed_limit", "Severity", "count").relabel_rows();

    match TableReshaper::new(&labels).to_table(&speed_severity_records(), &spec) {
        Err(TabulatorError::UnknownLabel { field, value }) => {
            assert_eq!(field, "Speed_limit");
            assert_eq!(value, "40");
        }
        other => panic!("expected UnknownLabel, got {:?}", other),
    }
}

#[test]
fn later_record_wins_for_repeated_pair() {
    let records = vec![
        json!({"row": "A", "col": "X", "value": 1}),
        json!({"row": "A", "col": "X", "value": 2}),
        json!({"row": "B", "col": "X", "value": 3}),
        json!({"row": "A", "col": "X", "value": 4}),
    ];
    let table = to_table(&records, &PivotSpec::new("row", "col", "value"), &LabelMap::new()).unwrap();
    assert_eq!(table.shape(), (2, 1));
    assert_eq!(table.get(&text("A"), &text("X")), Some(&Scalar::Int(4)));
    assert_eq!(table.get(&text("B"), &text("X")), Some(&Scalar::Int(3)));
}

#[test]
fn speed_limit_by_severity() {
    let spec = PivotSpec::new("Speed_limit", "Severity", "count").fill(0i64);
    let table = to_table(&speed_severity_records(), &spec, &LabelMap::new()).unwrap();

    assert_eq!(table.row_keys(), &[Scalar::Int(30), Scalar::Int(40)]);
    assert_eq!(table.column_keys(), &[Scalar::Int(1), Scalar::Int(2)]);
    assert_eq!(table.row_axis(), "Speed_limit");
    assert_eq!(table.column_axis(), "Severity");

    let cell = |r: i64, c: i64| table.get(&Scalar::Int(r), &Scalar::Int(c)).cloned();
    assert_eq!(cell(30, 1), Some(Scalar::Int(10)));
    assert_eq!(cell(30, 2), Some(Scalar::Int(4)));
    assert_eq!(cell(40, 1), Some(Scalar::Int(7)));
    assert_eq!(cell(40, 2), Some(Scalar::Int(0)));
}

#[test]
fn relabelled_report_renders_and_converts() {
    let labels = LabelMap::from_json(&json!({"Severity": {"1": "Fatal", "2": "Serious"}})).unwrap();
    let spec = PivotSpec::new("Speed_limit", "Severity", "count")
        .fill(0i64)
        .relabel_columns()
        .column_axis_label("Accident severity");
    let table = TableReshaper::new(&labels)
        .to_table(&speed_severity_records(), &spec)
        .unwrap();

    let rendered = table.to_string();
    let header = rendered.lines().nth(1).unwrap();
    assert!(header.contains("Accident severity"));
    assert!(header.contains("Fatal") && header.contains("Serious"));

    let df = table.to_dataframe().unwrap();
    assert_eq!(df.get_column_names(), vec!["Speed_limit", "Fatal", "Serious"]);
    assert_eq!(df.column("Serious").unwrap().i64().unwrap().get(1), Some(0));

    let json = serde_json::to_value(&table).unwrap();
    assert_eq!(json["columns"], json!(["Fatal", "Serious"]));
    assert_eq!(json["cells"], json!([[10, 4], [7, 0]]));
}

#[test]
fn missing_row_or_column_field_fails() {
    let records = vec![
        json!({"row": "A", "col": "X", "value": 1}),
        json!({"col": "Y", "value": 2}),
    ];
    match to_table(&records, &PivotSpec::new("row", "col", "value"), &LabelMap::new()) {
        Err(TabulatorError::MissingField { field, record }) => {
            assert_eq!(field, "row");
            assert_eq!(record, 1);
        }
        other => panic!("expected MissingField, got {:?}", other),
    }

    let records = vec![json!({"row": "A", "value": 1})];
    match to_table(&records, &PivotSpec::new("row", "col", "value"), &LabelMap::new()) {
        Err(TabulatorError::MissingField { field, record }) => {
            assert_eq!(field, "col");
            assert_eq!(record, 0);
        }
        other => panic!("expected MissingField, got {:?}", other),
    }
}

#[test]
fn relabelled_rows_keep_their_cells() {
    let labels = LabelMap::new()
        .with("Speed_limit", 30i64, "Urban")
        .with("Speed_limit", 40i64, "Suburban");
    let spec = PivotSpec::new("Speed_limit", "Severity", "count")
        .fill(0i64)
        .relabel_rows();
    let table = TableReshaper::new(&labels)
        .to_table(&speed_severity_records(), &spec)
        .unwrap();

    assert_eq!(table.row_keys(), &[text("Urban"), text("Suburban")]);
    assert_eq!(table.column_keys(), &[Scalar::Int(1), Scalar::Int(2)]);
    assert_eq!(table.get(&text("Urban"), &Scalar::Int(2)), Some(&Scalar::Int(4)));
    assert_eq!(table.get(&text("Suburban"), &Scalar::Int(2)), Some(&Scalar::Int(0)));
}

#[test]
fn collision_policy_reaches_the_reshaper() {
    // `_id.count` is visited before the top-level `count`.
    let records = vec![json!({"_id": {"row": "A", "col": "X", "count": 1}, "count": 2})];

    let spec = PivotSpec::new("row", "col", "count");
    assert!(matches!(
        to_table(&records, &spec, &LabelMap::new()),
        Err(TabulatorError::FieldCollision { record: 0, .. })
    ));

    let table = to_table(&records, &spec.clone().collision(CollisionPolicy::LastWins), &LabelMap::new()).unwrap();
    assert_eq!(table.get(&text("A"), &text("X")), Some(&Scalar::Int(2)));

    let table = to_table(&records, &spec.collision(CollisionPolicy::FirstWins), &LabelMap::new()).unwrap();
    assert_eq!(table.get(&text("A"), &text("X")), Some(&Scalar::Int(1)));
}
