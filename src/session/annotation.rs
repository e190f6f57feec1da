use crate::custom::CustomFields;
use crate::scanner::{ExperimentStatus, ScanSnapshot, ScanStatus};

/// Scanner columns appended to each row.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusFields {
    pub scan: ScanStatus,
    pub experiment: ExperimentStatus,
    pub exp_number: String,
}

/// Which extra columns a session appends after the channel values. Fixed for
/// the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnnotationSchema {
    pub include_status: bool,
    /// Column names of the enabled custom values, in slot order.
    pub custom_labels: Vec<String>,
}

impl AnnotationSchema {
    pub fn new(include_status: bool, custom: &CustomFields) -> Self {
        Self {
            include_status,
            custom_labels: custom.column_labels(),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.include_status && self.custom_labels.is_empty()
    }

    /// Annotation for the current scanner state and operator custom values.
    /// Values beyond the enabled slots are ignored; missing values are empty.
    pub fn annotate(&self, snapshot: &ScanSnapshot, custom_values: &[String]) -> Annotation {
        let status = self.include_status.then(|| StatusFields {
            scan: snapshot.scan,
            experiment: snapshot.experiment,
            exp_number: snapshot.exp_number.clone(),
        });
        let custom = (0..self.custom_labels.len())
            .map(|slot| {
                custom_values
                    .get(slot)
                    .map(|value| sanitize_field(value))
                    .unwrap_or_default()
            })
            .collect();
        Annotation { status, custom }
    }
}

/// Controller-side annotations for one tick: scanner state and custom values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Annotation {
    pub status: Option<StatusFields>,
    pub custom: Vec<String>,
}

impl Annotation {
    /// Fields in log column order.
    pub fn fields(&self) -> Vec<String> {
        let mut fields = Vec::with_capacity(3 + self.custom.len());
        if let Some(status) = &self.status {
            fields.push(status.scan.as_wire().to_string());
            fields.push(status.experiment.as_wire().to_string());
            fields.push(status.exp_number.clone());
        }
        fields.extend(self.custom.iter().cloned());
        fields
    }

    /// Comma-joined form written at the end of each log row.
    pub fn to_wire(&self) -> String {
        self.fields().join(",")
    }
}

/// Custom values are free text; spaces and commas would break the column
/// layout of the log.
fn sanitize_field(value: &str) -> String {
    value.chars().filter(|c| *c != ' ' && *c != ',').collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scanning() -> ScanSnapshot {
        ScanSnapshot {
            scan: ScanStatus::Reco,
            experiment: ExperimentStatus::Scan,
            exp_number: "12".into(),
            data_path: PathBuf::from("/data/subj"),
            study_path: PathBuf::from("/data/subj/12"),
        }
    }

    fn schema_with_two_customs() -> AnnotationSchema {
        let mut custom = CustomFields::default();
        custom.set_label(0, "Iso Set").unwrap();
        custom.set_label(1, "Stim").unwrap();
        custom.set_enabled(0, true).unwrap();
        custom.set_enabled(1, true).unwrap();
        AnnotationSchema::new(true, &custom)
    }

    #[test]
    fn wire_form_keeps_column_order() {
        let schema = schema_with_two_customs();
        let annotation = schema.annotate(&scanning(), &["1.5 %".into(), "on".into(), "ignored".into()]);
        assert_eq!(annotation.to_wire(), "RECO,Scan,12,1.5%,on");
    }

    #[test]
    fn schema_is_empty_without_status_or_customs() {
        assert!(!schema_with_two_customs().is_empty());
        assert!(AnnotationSchema::default().is_empty());
        assert!(!AnnotationSchema::new(true, &CustomFields::default()).is_empty());
    }
}
