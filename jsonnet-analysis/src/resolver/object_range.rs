use crate::ast::{field_name_to_string, Bind, Field, LocRange, Location, Node, Param};

/// A resolved definition target: the file it lives in, the span of the whole
/// construct, and the identifier-sized span clients should highlight.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRange {
    pub filename: String,
    pub selection_range: LocRange,
    pub full_range: LocRange,
    pub field_name: String,
    /// Body of the field or bind this range points at, when there is one.
    pub node: Option<Node>,
}

impl ObjectRange {
    /// A range covering only `loc`, with no associated body. Used for
    /// parameters and import targets.
    pub fn bare(loc: LocRange) -> Self {
        Self {
            filename: loc.file.clone(),
            selection_range: loc.clone(),
            full_range: loc,
            field_name: String::new(),
            node: None,
        }
    }
}

/// Range of an object field: the full field for context, the name for the
/// selection.
pub fn field_to_range(field: &Field) -> ObjectRange {
    let name = field_name_to_string(&field.name);
    let selection_range = LocRange::new(
        field.loc.file.clone(),
        field.loc.begin,
        Location::new(field.loc.begin.line, field.loc.begin.column + name.len()),
    );
    ObjectRange {
        filename: field.loc.file.clone(),
        selection_range,
        full_range: field.loc.clone(),
        field_name: name,
        node: Some(field.body.clone()),
    }
}

/// Range of a `local` bind. Binds synthesized without their own span borrow
/// their body's.
pub fn bind_to_range(bind: &Bind) -> ObjectRange {
    let loc = if bind.loc.is_set() {
        bind.loc.clone()
    } else {
        bind.body.loc().clone()
    };
    let selection_range = LocRange::new(
        loc.file.clone(),
        loc.begin,
        Location::new(loc.begin.line, loc.begin.column + bind.variable.len()),
    );
    ObjectRange {
        filename: loc.file.clone(),
        selection_range,
        full_range: loc,
        field_name: String::new(),
        node: Some(bind.body.clone()),
    }
}

pub fn param_to_range(param: &Param) -> ObjectRange {
    ObjectRange::bare(param.loc.clone())
}
