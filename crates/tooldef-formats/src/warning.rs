use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use tooldef_core::{ToolFormat, ToolGeometry};

/// Non-fatal loss recorded while encoding a geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversionWarning {
    /// A geometry field the destination format has no slot for.
    DroppedField { format: ToolFormat, field: String },
    /// Fields carried over from a different source format.
    DroppedOpaque {
        source: ToolFormat,
        fields: Vec<String>,
    },
    /// Marker coordinates were changed to fit the destination.
    GeometryChanged { reason: String },
}

impl fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DroppedField { format, field } => {
                write!(f, "{format} has no `{field}` field; dropped")
            }
            Self::DroppedOpaque { source, fields } => {
                write!(f, "dropped {source}-only fields: {}", fields.join(", "))
            }
            Self::GeometryChanged { reason } => write!(f, "geometry changed: {reason}"),
        }
    }
}

/// Collects warnings for one encode and logs each as it is recorded.
pub(crate) struct Warnings {
    format: ToolFormat,
    list: Vec<ConversionWarning>,
}

impl Warnings {
    pub fn new(format: ToolFormat) -> Self {
        Self {
            format,
            list: Vec::new(),
        }
    }

    pub fn push(&mut self, warning: ConversionWarning) {
        warn!("{warning}");
        self.list.push(warning);
    }

    pub fn dropped(&mut self, field: &str) {
        self.push(ConversionWarning::DroppedField {
            format: self.format,
            field: field.to_string(),
        });
    }

    pub fn geometry_changed(&mut self, reason: impl Into<String>) {
        self.push(ConversionWarning::GeometryChanged {
            reason: reason.into(),
        });
    }

    /// Record the loss of opaque metadata that belongs to another format.
    pub fn foreign_opaque(&mut self, geometry: &ToolGeometry) {
        if let Some(opaque) = &geometry.opaque {
            if opaque.format != self.format && !opaque.is_empty() {
                self.push(ConversionWarning::DroppedOpaque {
                    source: opaque.format,
                    fields: opaque.field_names(),
                });
            }
        }
    }

    pub fn into_vec(self) -> Vec<ConversionWarning> {
        self.list
    }
}
