//! Push layouts (push-object-list descriptions)
//!
//! A push setup object sends the values of its capture objects as one
//! structure, without repeating their identities. A [`PushLayout`] restores
//! the missing identities: element *i* of the received structure belongs to
//! the capture object at position *i*.

use crate::error::{DlmsError, DlmsResult};
use dlms_core::{DataObject, DataObjectType, ObisCode};
use serde::{Deserialize, Serialize};

/// One entry of a push-object-list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureObject {
    pub position: usize,
    pub class_id: u16,
    pub obis: ObisCode,
    #[serde(default = "default_attribute")]
    pub attribute: i8,
    /// Expected data type; `None` accepts any type
    #[serde(rename = "type", default)]
    pub data_type: Option<DataObjectType>,
}

fn default_attribute() -> i8 {
    2
}

impl CaptureObject {
    pub fn new(position: usize, class_id: u16, obis: ObisCode, attribute: i8) -> Self {
        Self {
            position,
            class_id,
            obis,
            attribute,
            data_type: None,
        }
    }

    pub fn with_type(mut self, data_type: DataObjectType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    /// Whether `value` has the declared type (always true without one)
    pub fn accepts(&self, value: &DataObject) -> bool {
        self.data_type
            .map(|expected| expected == value.get_type())
            .unwrap_or(true)
    }
}

/// Named, ordered list of capture objects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushLayout {
    pub name: String,
    pub length: usize,
    pub contents: Vec<CaptureObject>,
}

impl PushLayout {
    pub fn new(name: impl Into<String>, mut contents: Vec<CaptureObject>) -> Self {
        contents.sort_by_key(|c| c.position);
        Self {
            name: name.into(),
            length: contents.len(),
            contents,
        }
    }

    /// Check the declared length against the contents and that positions
    /// run contiguously from 0
    pub fn validate(&self) -> DlmsResult<()> {
        if self.name.trim().is_empty() {
            return Err(DlmsError::Configuration(
                "Push layout without a name".to_string(),
            ));
        }
        if self.length != self.contents.len() {
            return Err(DlmsError::Configuration(format!(
                "Push layout '{}' declares length {} but has {} contents",
                self.name,
                self.length,
                self.contents.len()
            )));
        }
        let mut positions: Vec<usize> = self.contents.iter().map(|c| c.position).collect();
        positions.sort_unstable();
        if positions.iter().enumerate().any(|(i, p)| i != *p) {
            return Err(DlmsError::Configuration(format!(
                "Push layout '{}' positions must run 0..{} without gaps or duplicates",
                self.name,
                self.length.saturating_sub(1)
            )));
        }
        Ok(())
    }

    /// Capture object at `position`
    pub fn capture_object(&self, position: usize) -> Option<&CaptureObject> {
        self.contents.iter().find(|c| c.position == position)
    }

    /// Whether every declared type agrees with the received elements
    pub fn matches_signature(&self, elements: &[DataObject]) -> bool {
        elements.len() == self.length
            && elements.iter().enumerate().all(|(i, value)| {
                self.capture_object(i)
                    .map(|c| c.accepts(value))
                    .unwrap_or(false)
            })
    }
}

/// Pick the layout describing a notification body of `elements`
///
/// A layout whose length is unique among `layouts` is chosen on element
/// count alone. When several layouts share the count, the first whose type
/// signature matches wins.
pub fn select_layout<'a>(
    layouts: &'a [PushLayout],
    elements: &[DataObject],
) -> DlmsResult<&'a PushLayout> {
    let count = elements.len();
    let mut candidates = layouts.iter().filter(|l| l.length == count);

    match (candidates.next(), candidates.next()) {
        (Some(only), None) => Ok(only),
        (Some(_), Some(_)) => layouts
            .iter()
            .filter(|l| l.length == count)
            .find(|l| l.matches_signature(elements))
            .ok_or_else(|| {
                DlmsError::Decode(format!(
                    "No push layout with {} elements matches the received types",
                    count
                ))
            }),
        (None, _) => Err(DlmsError::Decode(format!(
            "No push layout describes a telegram of {} elements",
            count
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn energy_layout() -> PushLayout {
        PushLayout::new(
            "energy",
            vec![
                CaptureObject::new(0, 1, ObisCode::new(0, 0, 96, 1, 0, 255), 2)
                    .with_type(DataObjectType::OctetString),
                CaptureObject::new(1, 3, ObisCode::new(1, 0, 1, 8, 0, 255), 2)
                    .with_type(DataObjectType::Unsigned32),
            ],
        )
    }

    fn power_layout() -> PushLayout {
        PushLayout::new(
            "power",
            vec![
                CaptureObject::new(0, 1, ObisCode::new(0, 0, 96, 1, 0, 255), 2)
                    .with_type(DataObjectType::OctetString),
                CaptureObject::new(1, 3, ObisCode::new(1, 0, 1, 7, 0, 255), 2)
                    .with_type(DataObjectType::Unsigned16),
            ],
        )
    }

    #[test]
    fn test_validate() {
        assert!(energy_layout().validate().is_ok());

        let mut wrong_length = energy_layout();
        wrong_length.length = 3;
        assert!(wrong_length.validate().is_err());

        let mut gap = energy_layout();
        gap.contents[1].position = 2;
        assert!(matches!(gap.validate(), Err(DlmsError::Configuration(_))));
    }

    #[test]
    fn test_select_by_unique_length() {
        let layouts = vec![energy_layout()];
        // type mismatch is not checked during selection by length
        let body = vec![DataObject::OctetString(vec![1]), DataObject::Unsigned16(3)];
        assert_eq!(select_layout(&layouts, &body).unwrap().name, "energy");
    }

    #[test]
    fn test_select_by_signature() {
        let layouts = vec![energy_layout(), power_layout()];
        let body = vec![DataObject::OctetString(vec![1]), DataObject::Unsigned16(3)];
        assert_eq!(select_layout(&layouts, &body).unwrap().name, "power");

        let body = vec![DataObject::OctetString(vec![1]), DataObject::Unsigned32(3)];
        assert_eq!(select_layout(&layouts, &body).unwrap().name, "energy");

        let body = vec![DataObject::OctetString(vec![1]), DataObject::Integer8(3)];
        assert!(select_layout(&layouts, &body).is_err());
    }

    #[test]
    fn test_select_unknown_length() {
        let layouts = vec![energy_layout()];
        assert!(matches!(
            select_layout(&layouts, &[DataObject::Null]),
            Err(DlmsError::Decode(_))
        ));
    }
}
