use bidlens_lib::{
    core::types::EvidenceSet,
    sections::{
        deliverables::{DeliverablesExtraction, DeliverablesSection},
        AssemblyInput, SectionDefinition,
    },
};
use serde_json::json;

fn extraction_with_repeated_name() -> DeliverablesExtraction {
    serde_json::from_value(json!({
        "summary": "Zwei Unterlagen heißen Konzept: ein technisches Pflichtkonzept und ein optionales Formblatt.",
        "dashboardHighlights": ["Zwei Bestandteile mit gleichem Namen"],
        "confidence": 70,
        "deliverables": [
            {
                "name": "Konzept",
                "category": "technical",
                "mandatory": true,
                "evidenceChunkIds": [],
                "needsManualReview": true
            },
            {
                "name": "Konzept",
                "category": "administrative",
                "mandatory": false,
                "evidenceChunkIds": [],
                "needsManualReview": true
            }
        ]
    }))
    .expect("extraction")
}

#[test]
fn inventory_effort_follows_row_position_when_names_repeat() {
    let section = DeliverablesSection;
    let extraction = extraction_with_repeated_name();
    let estimate = section
        .estimate(Some(&extraction))
        .expect("estimate")
        .expect("deliverables always estimate");
    let hours = estimate
        .per_deliverable
        .iter()
        .map(|row| row.effort_hours)
        .collect::<Vec<_>>();
    assert_eq!(hours.len(), 2);
    assert_ne!(hours[0], hours[1]);

    let evidence = EvidenceSet::from_chunks(vec![]);
    let assembled = section
        .assemble(&AssemblyInput {
            scope_id: "scope-dup",
            extraction: Some(&extraction),
            estimate: Some(&estimate),
            evidence: &evidence,
            confidence: 70,
        })
        .expect("assemble");

    let table = assembled
        .visualization
        .elements
        .get("inventory-table")
        .expect("inventory table");
    let rows = table.props["rows"].as_array().expect("rows");
    let table_hours = rows
        .iter()
        .map(|row| row["effortHours"].as_f64().expect("effort hours"))
        .collect::<Vec<_>>();
    assert_eq!(table_hours, hours);
    assert_eq!(rows[1]["category"], "Formalien");
}
