//! Columns resolved to their concrete array type once per batch

use arrow::array::{Array, AsArray, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{Float64Type, Int64Type, TimestampMicrosecondType};
use chrono::NaiveDateTime;

use crate::error::{IngestError, IngestResult};
use crate::normalize::NormalizedBatch;
use crate::schema::{ColumnKind, TableSchema};

pub(crate) enum TypedColumn<'a> {
    Int64(&'a Int64Array),
    Float64(&'a Float64Array),
    Timestamp(&'a TimestampMicrosecondArray),
    Text(&'a StringArray),
}

impl TypedColumn<'_> {
    pub(crate) fn int64(&self, row: usize) -> Option<i64> {
        match self {
            TypedColumn::Int64(a) if a.is_valid(row) => Some(a.value(row)),
            _ => None,
        }
    }

    pub(crate) fn float64(&self, row: usize) -> Option<f64> {
        match self {
            TypedColumn::Float64(a) if a.is_valid(row) => Some(a.value(row)),
            _ => None,
        }
    }

    pub(crate) fn timestamp(&self, row: usize) -> Option<NaiveDateTime> {
        match self {
            TypedColumn::Timestamp(a) if a.is_valid(row) => a.value_as_datetime(row),
            _ => None,
        }
    }

    pub(crate) fn text(&self, row: usize) -> Option<&str> {
        match self {
            TypedColumn::Text(a) if a.is_valid(row) => Some(a.value(row)),
            _ => None,
        }
    }
}

/// Downcast every declared column of `batch`
pub(crate) fn downcast_columns<'a>(
    schema: &TableSchema,
    batch: &'a NormalizedBatch,
) -> IngestResult<Vec<TypedColumn<'a>>> {
    schema
        .columns()
        .iter()
        .enumerate()
        .map(|(index, spec)| {
            let array = batch.column(index);
            let typed = match spec.kind {
                ColumnKind::Int64 => array.as_primitive_opt::<Int64Type>().map(TypedColumn::Int64),
                ColumnKind::Float64 => {
                    array.as_primitive_opt::<Float64Type>().map(TypedColumn::Float64)
                },
                ColumnKind::Timestamp => array
                    .as_primitive_opt::<TimestampMicrosecondType>()
                    .map(TypedColumn::Timestamp),
                ColumnKind::Text => array.as_string_opt::<i32>().map(TypedColumn::Text),
            };
            typed.ok_or_else(|| {
                IngestError::Schema(format!(
                    "column '{}' holds {} instead of {:?}",
                    spec.name,
                    array.data_type(),
                    spec.kind
                ))
            })
        })
        .collect()
}
