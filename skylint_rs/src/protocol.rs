//! Protocol-definition index.
//!
//! Loads a MAVLink-style XML message definition file once and builds the
//! read-only maps the analyzer consumes:
//!
//! - which struct field carries the coordinate-frame discriminator
//!   (`<field enum="MAV_FRAME" .../>`),
//! - which struct fields carry which physical unit (`units="..."`), with a
//!   stable integer id per unit spelling, assigned on first sight,
//! - the SI dimension of every unit spelling the static table knows.
//!
//! Message names map to C struct names the way the generated headers do:
//! `OBSTACLE_DISTANCE` becomes `mavlink_obstacle_distance_t`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::types::UnitId;
use crate::units::{Dimension, string_to_dimension};

#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed protocol definitions: {0}")]
    Xml(String),
    #[error("malformed prior file {path}: {source}")]
    PriorJson {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Read-only index over the protocol definitions.
#[derive(Debug, Clone, Default)]
pub struct ProtocolSpec {
    /// Struct name to the single field carrying the frame discriminator.
    pub type_to_frame_field: HashMap<String, String>,
    /// Struct name to field name to the field's unit id.
    pub type_to_field_units: HashMap<String, HashMap<String, UnitId>>,
    /// Unit spelling to its stable id.
    pub unit_name_to_id: HashMap<String, UnitId>,
    /// Unit id to SI dimension, for spellings the static table knows.
    pub unit_dimensions: HashMap<UnitId, Dimension>,
    /// Total number of unit ids assigned.
    pub num_units: i32,
}

impl ProtocolSpec {
    pub fn load(path: &Path) -> Result<ProtocolSpec, SpecError> {
        let raw = fs::read_to_string(path).map_err(|source| SpecError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        ProtocolSpec::parse(&raw)
    }

    /// Parses the XML document in one streaming pass.
    pub fn parse(xml: &str) -> Result<ProtocolSpec, SpecError> {
        let mut spec = ProtocolSpec::default();
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<String> = Vec::new();
        let mut current_struct: Option<String> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = element_name(&e);
                    if name == "message" && stack == ["mavlink", "messages"] {
                        current_struct =
                            attr_value(&e, b"name")?.map(|n| message_struct_name(&n));
                    } else if name == "field" {
                        spec.record_field(&e, current_struct.as_deref())?;
                    }
                    stack.push(name);
                }
                Ok(Event::Empty(e)) => {
                    let name = element_name(&e);
                    if name == "field" {
                        spec.record_field(&e, current_struct.as_deref())?;
                    }
                }
                Ok(Event::End(_)) => {
                    if stack.pop().as_deref() == Some("message") {
                        current_struct = None;
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(SpecError::Xml(e.to_string())),
            }
        }
        Ok(spec)
    }

    fn record_field(
        &mut self,
        element: &BytesStart<'_>,
        current_struct: Option<&str>,
    ) -> Result<(), SpecError> {
        let Some(struct_name) = current_struct else {
            return Ok(());
        };
        let Some(field_name) = attr_value(element, b"name")? else {
            return Ok(());
        };

        if attr_value(element, b"enum")?.as_deref() == Some("MAV_FRAME") {
            // The first frame-discriminator field of a message wins.
            self.type_to_frame_field
                .entry(struct_name.to_string())
                .or_insert_with(|| field_name.clone());
        }

        if let Some(unit_name) = attr_value(element, b"units")? {
            let id = self.intern_unit(&unit_name);
            self.type_to_field_units
                .entry(struct_name.to_string())
                .or_default()
                .insert(field_name, id);
        }
        Ok(())
    }

    /// Assigns a stable id to a unit spelling on first sight.
    fn intern_unit(&mut self, name: &str) -> UnitId {
        if let Some(&id) = self.unit_name_to_id.get(name) {
            return id;
        }
        let id = self.num_units;
        self.num_units += 1;
        self.unit_name_to_id.insert(name.to_string(), id);
        if let Some(dim) = string_to_dimension(name) {
            self.unit_dimensions.insert(id, dim);
        }
        id
    }

    /// Whether a C/C++ type name is one of the protocol's message structs.
    pub fn is_message_type(&self, type_name: &str) -> bool {
        self.type_to_frame_field.contains_key(type_name)
            || self.type_to_field_units.contains_key(type_name)
    }

    /// Whether the type carries a frame discriminator at all.
    pub fn has_frame_field(&self, type_name: &str) -> bool {
        self.type_to_frame_field.contains_key(type_name)
    }

    /// Resolves a unit spelling; unknown spellings get the distinguished
    /// unknown id.
    pub fn unit_id(&self, name: &str) -> UnitId {
        self.unit_name_to_id
            .get(name)
            .copied()
            .unwrap_or(crate::types::UNKNOWN_UNIT)
    }
}

/// The C struct name generated for a message: lower-cased and wrapped as
/// `mavlink_<name>_t`.
pub fn message_struct_name(message_name: &str) -> String {
    format!("mavlink_{}_t", message_name.to_lowercase())
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, SpecError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| SpecError::Xml(err.to_string()))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|err| SpecError::Xml(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
