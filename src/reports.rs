//! Canned reports over the road accidents collection

use crate::docstore::DocStore;
use crate::error::Result;
use crate::reshape::{LabelMap, LabelTable, PivotSpec, TableReshaper};
use mongodb::bson::{doc, Document};
use tracing::info;

pub const ACCIDENTS_COLLECTION: &str = "accidents";
pub const DEFAULT_MIN_SPEED: i32 = 30;

/// Count accidents at or above `min_speed`, grouped by speed limit and
/// severity, sorted by both.
pub fn speed_severity_pipeline(min_speed: i32) -> Vec<Document> {
    vec![
        doc! {"$match": {"Speed_limit": {"$gte": min_speed}}},
        doc! {
            "$group": {
                "_id": {"Speed_limit": "$Speed_limit", "Accident_Severity": "$Accident_Severity"},
                "num_accidents": {"$sum": 1}
            }
        },
        doc! {"$sort": {"_id.Speed_limit": 1, "_id.Accident_Severity": 1}},
    ]
}

/// Speed limits down the side, labelled severities across the top in
/// severity code order, zero where no accidents were recorded.
pub fn speed_severity_spec() -> PivotSpec {
    PivotSpec::new("Speed_limit", "Accident_Severity", "num_accidents")
        .fill(0i64)
        .sort_rows()
        .sort_columns()
        .relabel_columns()
}

pub async fn accidents_by_speed_and_severity(
    store: &DocStore,
    collection: &str,
    labels: &LabelMap,
    min_speed: i32,
) -> Result<LabelTable> {
    let results = store
        .aggregate(collection, speed_severity_pipeline(min_speed))
        .await?;
    info!("{} speed/severity groups", results.len());

    TableReshaper::new(labels).to_table(&results, &speed_severity_spec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reshape::Scalar;
    use serde_json::json;

    #[test]
    fn test_pipeline_shape() {
        let pipeline = speed_severity_pipeline(40);
        assert_eq!(pipeline.len(), 3);

        let matched = pipeline[0].get_document("$match").unwrap();
        let speed = matched.get_document("Speed_limit").unwrap();
        assert_eq!(speed.get_i32("$gte").unwrap(), 40);

        let group = pipeline[1].get_document("$group").unwrap();
        let id = group.get_document("_id").unwrap();
        assert_eq!(id.get_str("Speed_limit").unwrap(), "$Speed_limit");
        assert_eq!(id.get_str("Accident_Severity").unwrap(), "$Accident_Severity");
    }

    #[test]
    fn test_spec_reshapes_pipeline_output() {
        let labels = LabelMap::new()
            .with("Accident_Severity", 1i64, "Fatal")
            .with("Accident_Severity", 2i64, "Serious")
            .with("Accident_Severity", 3i64, "Slight");
        let results = vec![
            json!({"_id": {"Speed_limit": 30, "Accident_Severity": 1}, "num_accidents": 12}),
            json!({"_id": {"Speed_limit": 30, "Accident_Severity": 3}, "num_accidents": 840}),
            json!({"_id": {"Speed_limit": 70, "Accident_Severity": 2}, "num_accidents": 51}),
        ];

        let table = TableReshaper::new(&labels)
            .to_table(&results, &speed_severity_spec())
            .unwrap();

        assert_eq!(table.row_axis(), "Speed_limit");
        assert_eq!(table.column_axis(), "Accident_Severity");
        assert_eq!(
            table.column_keys(),
            &[Scalar::from("Fatal"), Scalar::from("Serious"), Scalar::from("Slight")]
        );
        assert_eq!(table.get(&Scalar::Int(70), &"Fatal".into()), Some(&Scalar::Int(0)));
        assert_eq!(table.get(&Scalar::Int(30), &"Slight".into()), Some(&Scalar::Int(840)));
        assert_eq!(table.get(&Scalar::Int(70), &"Serious".into()), Some(&Scalar::Int(51)));
        assert_eq!(table.row_keys(), &[Scalar::Int(30), Scalar::Int(70)]);
    }
}
