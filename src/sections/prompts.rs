pub const DELIVERABLES_QUERIES: &[&str] = &[
    "einzureichende Unterlagen Angebot Bestandteile",
    "Pflichtunterlagen Nachweise Eignung Erklärungen",
    "Preisblatt Leistungsverzeichnis kommerzielles Angebot",
    "Konzept Lösungsbeschreibung technische Unterlagen Seitenzahl",
    "Referenzen Referenzprojekte Nachweis",
    "Präsentation Bietergespräch Vorstellung",
    "Angebotsfrist Einreichung Vergabeplattform Form",
    "Vertragsbedingungen AGB Haftung Datenschutz Vereinbarung",
];

pub const OFFER_STRUCTURE_QUERIES: &[&str] = &[
    "Gliederung des Angebots Aufbau Struktur",
    "Kapitel Reihenfolge Inhaltsverzeichnis Angebot",
    "Formvorgaben Schriftgröße Seitenbegrenzung Dateiformat",
    "Unterschrift Signatur Textform elektronische Einreichung",
    "Ausschlusskriterien formale Anforderungen Vollständigkeit",
    "Zuschlagskriterien Bewertungsmatrix Gewichtung",
    "Bieterfragen Fristen Kommunikation Vergabestelle",
];

pub const DELIVERABLES_RESEARCH_QUESTIONS: &[&str] = &[
    "Welche Unterlagen verlangt der Auftraggeber üblicherweise in vergleichbaren Ausschreibungen?",
    "Gibt es veröffentlichte Bekanntmachungen oder Änderungen zu dieser Ausschreibung?",
];

pub const OFFER_STRUCTURE_RESEARCH_QUESTIONS: &[&str] = &[
    "Welche Formvorgaben nennt die Vergabeplattform des Auftraggebers für Angebote?",
];

const EVIDENCE_RULES: &str = "Regeln für Belege:\n\
- Jede Angabe nennt in evidenceChunkIds mindestens eine Chunk-ID aus dem Kontext und setzt needsManualReview auf false.\n\
- Findest du keinen passenden Chunk, bleibt evidenceChunkIds leer und needsManualReview ist true.\n\
- Beides gleichzeitig oder keines von beiden ist unzulässig.\n\
- Erfinde keine Chunk-IDs und keine Inhalte, die nicht im Kontext stehen.\n";

const OUTPUT_RULES: &str = "Ausgabe:\n\
- summary: sachliche Zusammenfassung mit mindestens 40 Zeichen.\n\
- dashboardHighlights: 1 bis 3 kurze Stichpunkte mit höchstens 140 Zeichen.\n\
- confidence: 0 bis 100, wie gut die Belege die Angaben tragen.\n";

pub fn deliverables_system_prompt() -> String {
    format!(
        "Du analysierst Vergabeunterlagen und listest alle einzureichenden Angebotsbestandteile auf.\n\
         Kategorisiere jeden Bestandteil als proposal_document, commercial, legal, technical, reference, administrative oder presentation.\n\
         Erfasse Pflicht oder optional, Format, Seitenbegrenzung, Einreichungsweg und Frist, soweit belegt.\n\
         Benenne Risiken, offene Fragen an die Vergabestelle und nächste Schritte.\n\n{EVIDENCE_RULES}\n{OUTPUT_RULES}"
    )
}

pub fn offer_structure_system_prompt() -> String {
    format!(
        "Du analysierst Vergabeunterlagen und leitest die geforderte Gliederung des Angebots ab.\n\
         Erfasse jeden Gliederungspunkt mit Titel, Pflicht, Reihenfolge, Seitenbegrenzung und Formvorgaben.\n\
         Liste formale Anforderungen (Form, Signatur, Dateiformate), Risiken, offene Fragen und nächste Schritte.\n\n{EVIDENCE_RULES}\n{OUTPUT_RULES}"
    )
}

pub fn extraction_prompt(section_label: &str, evidence_context: &str) -> String {
    let mut text = String::new();
    text.push_str(&format!("ABSCHNITT: {section_label}\n\n"));
    text.push_str("BELEGE (je Zeile [chunk:<id>] (<Fundstelle>) <Text>):\n");
    text.push_str(evidence_context);
    text.push_str("\nAntworte ausschließlich mit JSON gemäß Schema.\n");
    text
}
