use anyhow::{bail, Result};

use crate::conversion::{Conversion, Metric};

use super::annotation::{Annotation, AnnotationSchema};

const LOG_SEPARATOR: &str = ", ";
const DISPLAY_SEPARATOR: &str = " | ";

/// Column layout of one session, shared by the log file and the live display.
///
/// The log puts channel values before the annotation columns; the display
/// puts them after, followed by a warnings column that is never logged.
#[derive(Debug, Clone)]
pub struct RowLayout {
    metrics: Vec<Metric>,
    schema: AnnotationSchema,
}

impl RowLayout {
    pub fn new(metrics: Vec<Metric>, schema: AnnotationSchema) -> Self {
        Self { metrics, schema }
    }

    pub fn log_header(&self) -> String {
        let mut header = String::from("Count, TimeMS, ");
        header.push_str(&self.metric_names().join(LOG_SEPARATOR));
        if self.schema.include_status {
            header.push_str(", Status, ExpStatus, Exp");
        }
        for label in &self.schema.custom_labels {
            header.push_str(LOG_SEPARATOR);
            header.push_str(label);
        }
        header
    }

    /// One log row. `annotation` is `None` only before the controller's first
    /// publish reaches the loop; the annotation columns are then left empty.
    pub fn log_row(
        &self,
        count: u64,
        elapsed_secs: f64,
        values: &[Conversion],
        annotation: Option<&Annotation>,
    ) -> String {
        let values: Vec<String> = values.iter().map(|c| format!("{:.3}", c.value)).collect();
        let mut row = format!("{count}, {elapsed_secs:.1}, {}", values.join(LOG_SEPARATOR));
        if !self.schema.is_empty() {
            row.push_str(LOG_SEPARATOR);
            if let Some(annotation) = annotation {
                row.push_str(&annotation.to_wire());
            }
        }
        row
    }

    pub fn display_columns(&self) -> Vec<String> {
        let mut columns = vec!["Count".to_string(), "TimeMS".to_string()];
        if self.schema.include_status {
            columns.extend(["ScanStat", "ExpStat", "Exp"].map(String::from));
        }
        columns.extend(self.schema.custom_labels.iter().cloned());
        columns.extend(self.metric_names());
        columns.push("Warnings".to_string());
        columns
    }

    pub fn display_header(&self) -> String {
        let columns = self.display_columns();
        align(&columns, &columns).unwrap_or_else(|_| columns.join(DISPLAY_SEPARATOR))
    }

    /// Column-aligned rendering of a sample. Fails when the cells do not line
    /// up with the header, e.g. before the first annotation arrived.
    pub fn display_row(
        &self,
        count: u64,
        elapsed_secs: f64,
        values: &[Conversion],
        annotation: Option<&Annotation>,
    ) -> Result<String> {
        let mut cells = vec![count.to_string(), format!("{elapsed_secs:.1}")];
        if let Some(annotation) = annotation {
            cells.extend(annotation.fields());
        }
        cells.extend(values.iter().map(|c| format!("{:.1}", c.value)));
        let warnings: Vec<&str> = values.iter().map(|c| c.warning.unwrap_or("")).collect();
        cells.push(warnings.join(" "));
        align(&self.display_columns(), &cells)
    }

    fn metric_names(&self) -> Vec<String> {
        self.metrics.iter().map(|m| m.as_str().to_string()).collect()
    }
}

/// Left-align each cell to the width of its header.
fn align(header: &[String], cells: &[String]) -> Result<String> {
    if header.len() != cells.len() {
        bail!(
            "row has {} cells but the header has {} columns",
            cells.len(),
            header.len()
        );
    }
    let aligned: Vec<String> = header
        .iter()
        .zip(cells)
        .map(|(title, cell)| format!("{cell:<width$}", width = title.chars().count()))
        .collect();
    Ok(aligned.join(DISPLAY_SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom::CustomFields;
    use crate::scanner::{ExperimentStatus, ScanStatus};
    use crate::session::annotation::StatusFields;

    fn layout() -> RowLayout {
        let mut custom = CustomFields::default();
        custom.set_label(0, "Iso Set").unwrap();
        custom.set_enabled(0, true).unwrap();
        RowLayout::new(
            vec![Metric::T1Temp, Metric::Iso],
            AnnotationSchema::new(true, &custom),
        )
    }

    fn annotation() -> Annotation {
        Annotation {
            status: Some(StatusFields {
                scan: ScanStatus::Scanning,
                experiment: ExperimentStatus::Scan,
                exp_number: "5".into(),
            }),
            custom: vec!["1.5".into()],
        }
    }

    fn values() -> Vec<Conversion> {
        vec![
            Conversion { value: 36.4, warning: None },
            Conversion { value: 5.5, warning: Some("High Iso") },
        ]
    }

    #[test]
    fn log_header_lists_channels_then_annotations() {
        assert_eq!(
            layout().log_header(),
            "Count, TimeMS, T1Temp, Iso, Status, ExpStatus, Exp, IsoSet"
        );
    }

    #[test]
    fn log_row_uses_fixed_precision_and_omits_warnings() {
        let row = layout().log_row(3, 3.04, &values(), Some(&annotation()));
        assert_eq!(row, "3, 3.0, 36.400, 5.500, SCANNING,Scan,5,1.5");
    }

    #[test]
    fn log_row_without_schema_has_no_trailing_separator() {
        let layout = RowLayout::new(vec![Metric::T1Temp], AnnotationSchema::default());
        let row = layout.log_row(0, 0.0, &[Conversion { value: 0.0, warning: None }], None);
        assert_eq!(row, "0, 0.0, 0.000");
    }

    #[test]
    fn display_row_aligns_to_header_and_shows_warnings() {
        let layout = layout();
        assert_eq!(
            layout.display_header(),
            "Count | TimeMS | ScanStat | ExpStat | Exp | IsoSet | T1Temp | Iso | Warnings"
        );
        let row = layout.display_row(3, 3.04, &values(), Some(&annotation())).unwrap();
        assert_eq!(
            row,
            "3     | 3.0    | SCANNING | Scan    | 5   | 1.5    | 36.4   | 5.5 |  High Iso"
        );
    }

    #[test]
    fn display_row_without_annotation_is_skipped() {
        assert!(layout().display_row(0, 0.0, &values(), None).is_err());
    }
}
