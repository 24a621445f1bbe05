//! Chip and tile identifiers.
//!
//! Identifiers enter the graph as a partitioned collection of coordinate
//! pairs and can be projected into a two-column Arrow table for export.

use arrow::array::{ArrayRef, Int32Array, Int64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use landchange_engine::{Context, Data, Dataset, EngineError};
use landchange_protocol::PixelCoordinate;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Schema must declare exactly two non-null integer columns: {reason}")]
    InvalidSchema { reason: String },

    #[error("Row {row} has no value for non-null field '{field}'")]
    NullValue { field: String, row: usize },

    #[error("Row {row} value {value} does not fit field '{field}'")]
    OutOfRange { field: String, row: usize, value: i64 },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Arrow(#[from] ArrowError),
}

/// Distribute `coordinates` over `chunk_size` partitions.
///
/// Duplicates are kept. A chunk size of zero is treated as one.
pub fn generate<I, P>(ctx: &Context, coordinates: I, chunk_size: usize) -> Dataset<PixelCoordinate>
where
    I: IntoIterator<Item = P>,
    P: Into<PixelCoordinate>,
{
    let points: Vec<PixelCoordinate> = coordinates.into_iter().map(Into::into).collect();
    ctx.parallelize(points, chunk_size).with_name("chip ids")
}

/// Schema of chip grid cells: `(cx, cy)`.
pub fn chip_schema() -> SchemaRef {
    pair_schema("cx", "cy")
}

/// Schema of tile grid cells: `(tx, ty)`.
pub fn tile_schema() -> SchemaRef {
    pair_schema("tx", "ty")
}

fn pair_schema(x: &str, y: &str) -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(x, DataType::Int32, false),
        Field::new(y, DataType::Int32, false),
    ]))
}

/// A record that can be projected onto a two-column id table.
pub trait IdRow {
    fn cells(&self) -> [Option<i64>; 2];
}

impl IdRow for PixelCoordinate {
    fn cells(&self) -> [Option<i64>; 2] {
        [Some(self.x), Some(self.y)]
    }
}

impl IdRow for (i64, i64) {
    fn cells(&self) -> [Option<i64>; 2] {
        [Some(self.0), Some(self.1)]
    }
}

impl IdRow for (Option<i64>, Option<i64>) {
    fn cells(&self) -> [Option<i64>; 2] {
        [self.0, self.1]
    }
}

/// Materialise `dataset` into a single batch with `schema`.
///
/// The schema must have exactly two non-null `Int32` or `Int64` fields.
pub fn to_table<T>(dataset: &Dataset<T>, schema: SchemaRef) -> Result<RecordBatch, SchemaError>
where
    T: Data + IdRow,
{
    check_schema(&schema)?;
    let rows = dataset.collect()?;

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(2);
    for (idx, field) in schema.fields().iter().enumerate() {
        let mut values = Vec::with_capacity(rows.len());
        for (row, record) in rows.iter().enumerate() {
            let value = record.cells()[idx].ok_or_else(|| SchemaError::NullValue {
                field: field.name().clone(),
                row,
            })?;
            values.push(value);
        }
        columns.push(integer_column(field, values)?);
    }

    Ok(RecordBatch::try_new(schema, columns)?)
}

fn check_schema(schema: &Schema) -> Result<(), SchemaError> {
    let fields = schema.fields();
    if fields.len() != 2 {
        return Err(SchemaError::InvalidSchema {
            reason: format!("found {} columns", fields.len()),
        });
    }
    for field in fields.iter() {
        if field.is_nullable() {
            return Err(SchemaError::InvalidSchema {
                reason: format!("field '{}' is nullable", field.name()),
            });
        }
        if !matches!(field.data_type(), DataType::Int32 | DataType::Int64) {
            return Err(SchemaError::InvalidSchema {
                reason: format!("field '{}' has type {}", field.name(), field.data_type()),
            });
        }
    }
    Ok(())
}

fn integer_column(field: &Field, values: Vec<i64>) -> Result<ArrayRef, SchemaError> {
    match field.data_type() {
        DataType::Int32 => {
            let narrowed = values
                .into_iter()
                .enumerate()
                .map(|(row, value)| {
                    i32::try_from(value).map_err(|_| SchemaError::OutOfRange {
                        field: field.name().clone(),
                        row,
                        value,
                    })
                })
                .collect::<Result<Vec<i32>, _>>()?;
            Ok(Arc::new(Int32Array::from(narrowed)))
        }
        _ => Ok(Arc::new(Int64Array::from(values))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use landchange_engine::EngineConfig;

    fn ctx() -> Context {
        Context::new(EngineConfig::with_threads(2)).unwrap()
    }

    #[test]
    fn generate_keeps_duplicates() {
        let ctx = ctx();
        let ids: Vec<(i64, i64)> = vec![(1, 2), (1, 2), (3, 4)];
        let ds = generate(&ctx, ids, 2);
        assert_eq!(ds.num_partitions(), 2);
        let mut got = ds.collect().unwrap();
        got.sort();
        assert_eq!(
            got,
            vec![
                PixelCoordinate::new(1, 2),
                PixelCoordinate::new(1, 2),
                PixelCoordinate::new(3, 4)
            ]
        );
    }

    #[test]
    fn schemas_are_non_null_pairs() {
        let chip = chip_schema();
        assert_eq!(chip.field(0).name(), "cx");
        assert_eq!(chip.field(1).name(), "cy");
        assert!(!chip.field(0).is_nullable());
        let tile = tile_schema();
        assert_eq!(tile.field(0).name(), "tx");
        assert_eq!(tile.field(1).data_type(), &DataType::Int32);
    }

    #[test]
    fn to_table_projects_rows() {
        let ctx = ctx();
        let ids: Vec<(i64, i64)> = vec![(-1821585, 2891595), (-1818585, 2888595)];
        let ds = generate(&ctx, ids, 1);
        let batch = to_table(&ds, chip_schema()).unwrap();
        assert_eq!(batch.num_rows(), 2);
        let cx = batch
            .column(0)
            .as_any()
            .downcast_ref::<Int32Array>()
            .unwrap();
        assert_eq!(cx.value(0), -1821585);
        assert_eq!(cx.null_count(), 0);
    }

    #[test]
    fn to_table_rejects_absent_values() {
        let ctx = ctx();
        let ds = ctx.parallelize(vec![(Some(1i64), Some(2i64)), (Some(3), None)], 1);
        match to_table(&ds, tile_schema()) {
            Err(SchemaError::NullValue { field, row }) => {
                assert_eq!(field, "ty");
                assert_eq!(row, 1);
            }
            other => panic!("expected NullValue, got {:?}", other.map(|b| b.num_rows())),
        }
    }

    #[test]
    fn to_table_rejects_values_wider_than_int32() {
        let ctx = ctx();
        let ds = ctx.parallelize(vec![(i64::from(i32::MAX) + 1, 0i64)], 1);
        assert!(matches!(
            to_table(&ds, chip_schema()),
            Err(SchemaError::OutOfRange { row: 0, .. })
        ));
    }

    #[test]
    fn to_table_accepts_int64_schema() {
        let ctx = ctx();
        let schema = Arc::new(Schema::new(vec![
            Field::new("cx", DataType::Int64, false),
            Field::new("cy", DataType::Int64, false),
        ]));
        let ds = ctx.parallelize(vec![(i64::MAX, i64::MIN)], 1);
        let batch = to_table(&ds, schema).unwrap();
        let cy = batch
            .column(1)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(cy.value(0), i64::MIN);
    }

    #[test]
    fn to_table_rejects_nullable_schema() {
        let ctx = ctx();
        let schema = Arc::new(Schema::new(vec![
            Field::new("cx", DataType::Int32, true),
            Field::new("cy", DataType::Int32, false),
        ]));
        let ds = generate(&ctx, vec![PixelCoordinate::new(1, 1)], 1);
        assert!(matches!(
            to_table(&ds, schema),
            Err(SchemaError::InvalidSchema { .. })
        ));
    }
}
