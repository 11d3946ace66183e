//! Batch normalization against the declared table schema
//!
//! Every output batch has exactly the declared columns, in declared order,
//! with declared types. Source files are allowed to disagree with the table:
//!
//! - a declared column missing from the file becomes an all-null column
//! - file columns that are not declared are dropped
//! - values that cannot be converted become null
//! - float NaN becomes null, so the loader never sees a "missing" sentinel
//! - fractional floats bound for integer columns become null, never truncated
//! - NUL characters are removed from text
//!
//! Malformed values never produce an error. The returned [`NormalizeReport`]
//! counts what was degraded so callers can log it.

use std::sync::Arc;

use arrow::array::{new_null_array, Array, ArrayRef, AsArray, Int64Array, PrimitiveArray, StringArray};
use arrow::compute::{cast_with_options, CastOptions};
use arrow::datatypes::{ArrowPrimitiveType, DataType, Float16Type, Float32Type, Float64Type, SchemaRef};
use arrow::record_batch::RecordBatch;

use crate::error::{IngestError, IngestResult};
use crate::schema::{ColumnSpec, TableSchema};

/// A batch that conforms to a [`TableSchema`]
#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    batch: RecordBatch,
}

impl NormalizedBatch {
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn record_batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn column(&self, index: usize) -> &ArrayRef {
        self.batch.column(index)
    }
}

/// What normalization had to change in one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    /// Declared columns absent from the source, filled with nulls
    pub synthesized: Vec<String>,
    /// Source columns with no declared counterpart
    pub dropped: Vec<String>,
    /// Non-null source cells that came out null
    pub coerced_cells: usize,
}

impl NormalizeReport {
    pub fn is_clean(&self) -> bool {
        self.synthesized.is_empty() && self.dropped.is_empty() && self.coerced_cells == 0
    }
}

pub struct Normalizer {
    schema: Arc<TableSchema>,
    target: SchemaRef,
}

impl Normalizer {
    pub fn new(schema: Arc<TableSchema>) -> Self {
        let target = schema.arrow_schema();
        Self { schema, target }
    }

    /// Coerce `batch` into the declared layout
    ///
    /// The only error is an internal inconsistency while assembling the
    /// output batch; source data problems always degrade to nulls.
    pub fn normalize(&self, batch: &RecordBatch) -> IngestResult<(NormalizedBatch, NormalizeReport)> {
        let rows = batch.num_rows();
        let source = batch.schema();
        let mut report = NormalizeReport::default();
        let mut matched = vec![false; source.fields().len()];
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(self.schema.columns().len());

        for spec in self.schema.columns() {
            let target_type = spec.kind.arrow_type();

            let Some(index) = find_source_column(batch, spec) else {
                report.synthesized.push(spec.name.clone());
                columns.push(new_null_array(&target_type, rows));
                continue;
            };
            matched[index] = true;

            let input = batch.column(index);
            let output = coerce(input, &target_type, spec);
            report.coerced_cells += output.null_count().saturating_sub(input.null_count());
            columns.push(output);
        }

        report.dropped = source
            .fields()
            .iter()
            .zip(&matched)
            .filter(|(_, used)| !**used)
            .map(|(field, _)| field.name().clone())
            .collect();

        let batch = RecordBatch::try_new(self.target.clone(), columns)
            .map_err(|e| IngestError::Schema(format!("normalized batch rejected: {}", e)))?;

        Ok((NormalizedBatch { batch }, report))
    }
}

/// Exact name first, then a case-insensitive match
fn find_source_column(batch: &RecordBatch, spec: &ColumnSpec) -> Option<usize> {
    let fields = batch.schema_ref().fields();
    fields
        .iter()
        .position(|f| f.name() == &spec.name)
        .or_else(|| {
            fields
                .iter()
                .position(|f| f.name().eq_ignore_ascii_case(&spec.name))
        })
}

fn coerce(input: &ArrayRef, target: &DataType, spec: &ColumnSpec) -> ArrayRef {
    let input = null_out_nan(input);
    if target == &DataType::Int64 && is_float(input.data_type()) {
        return floats_to_int64(&input);
    }

    let options = CastOptions {
        safe: true,
        ..Default::default()
    };

    let cast = if input.data_type() == target {
        Ok(input.clone())
    } else {
        cast_with_options(&input, target, &options)
    };

    let output = match cast {
        Ok(array) => array,
        Err(e) => {
            tracing::debug!(
                column = %spec.name,
                from = %input.data_type(),
                to = %target,
                error = %e,
                "Unsupported conversion, column nulled"
            );
            return new_null_array(target, input.len());
        },
    };

    match target {
        // Parsed text may still spell NaN
        DataType::Float64 => null_out_nan(&output),
        DataType::Utf8 => strip_nul(output),
        _ => output,
    }
}

fn is_float(data_type: &DataType) -> bool {
    matches!(data_type, DataType::Float16 | DataType::Float32 | DataType::Float64)
}

fn null_out_nan(array: &ArrayRef) -> ArrayRef {
    match array.data_type() {
        DataType::Float16 => nan_to_null::<Float16Type>(array, |v| v.is_nan()),
        DataType::Float32 => nan_to_null::<Float32Type>(array, |v| v.is_nan()),
        DataType::Float64 => nan_to_null::<Float64Type>(array, |v| v.is_nan()),
        _ => array.clone(),
    }
}

fn nan_to_null<T: ArrowPrimitiveType>(array: &ArrayRef, is_nan: impl Fn(T::Native) -> bool) -> ArrayRef {
    let values = array.as_primitive::<T>();
    if !values.iter().flatten().any(&is_nan) {
        return array.clone();
    }
    let cleaned: PrimitiveArray<T> = values
        .iter()
        .map(|v| v.filter(|x| !is_nan(*x)))
        .collect();
    Arc::new(cleaned)
}

/// Whole floats only; fractional or out-of-range values become null
fn floats_to_int64(input: &ArrayRef) -> ArrayRef {
    // 2^63, the first float past i64::MAX
    const UPPER: f64 = 9_223_372_036_854_775_808.0;

    let widened = match cast_with_options(input, &DataType::Float64, &CastOptions::default()) {
        Ok(array) => array,
        Err(_) => return new_null_array(&DataType::Int64, input.len()),
    };
    let ints: Int64Array = widened
        .as_primitive::<Float64Type>()
        .iter()
        .map(|v| {
            v.filter(|x| x.fract() == 0.0 && *x >= -UPPER && *x < UPPER)
                .map(|x| x as i64)
        })
        .collect();
    Arc::new(ints)
}

/// Postgres text cannot hold NUL; both writers see the stripped value
fn strip_nul(array: ArrayRef) -> ArrayRef {
    let strings = array.as_string::<i32>();
    if !strings.iter().flatten().any(|s| s.contains('\0')) {
        return array;
    }
    let cleaned: StringArray = strings
        .iter()
        .map(|v| v.map(|s| s.replace('\0', "")))
        .collect();
    Arc::new(cleaned)
}
