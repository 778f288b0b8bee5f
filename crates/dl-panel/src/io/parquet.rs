//! Parquet readers / writers.
//!
//! Columns are cast to the expected Arrow type on read, so integer years,
//! boolean flags stored as integers, or dictionary-encoded strings are all
//! accepted.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use ::parquet::arrow::ArrowWriter;
use ::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use ::parquet::basic::Compression;
use ::parquet::file::properties::WriterProperties;
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int32Array, Int64Array, StringArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema};
use arrow::record_batch::RecordBatch;

use super::ReadError;
use crate::observation::{Panel, PanelObservation};
use crate::simulation::SimulationRow;

/// Read a Parquet file into Arrow RecordBatches.
pub fn read_parquet_batches(path: &Path) -> Result<Vec<RecordBatch>, ReadError> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let reader = builder.build()?;
    let batches: Result<Vec<_>, _> = reader.collect();
    Ok(batches?)
}

/// Write Arrow RecordBatches to a Parquet file (Snappy compressed).
pub fn write_parquet(path: &Path, batches: &[RecordBatch]) -> Result<(), ReadError> {
    if batches.is_empty() {
        return Ok(());
    }

    let schema = batches[0].schema();
    let props = WriterProperties::builder().set_compression(Compression::SNAPPY).build();

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    for batch in batches {
        writer.write(batch)?;
    }
    writer.close()?;
    Ok(())
}

/// Read a panel Parquet file.
pub fn read_panel_parquet(path: &Path) -> Result<Panel, ReadError> {
    let batches = read_parquet_batches(path)?;
    let mut rows = Vec::new();
    for batch in &batches {
        extract_panel_rows(batch, &mut rows)?;
    }
    Ok(Panel::new(rows)?)
}

/// Write a panel as a single-batch Parquet file.
pub fn write_panel_parquet(path: &Path, panel: &Panel) -> Result<(), ReadError> {
    let batch = panel_to_record_batch(panel)?;
    write_parquet(path, &[batch])
}

/// Read a simulation results Parquet file.
pub fn read_simulation_parquet(path: &Path) -> Result<Vec<SimulationRow>, ReadError> {
    let batches = read_parquet_batches(path)?;
    let mut rows = Vec::new();
    for batch in &batches {
        extract_simulation_rows(batch, &mut rows)?;
    }
    Ok(rows)
}

/// Convert a panel into an Arrow RecordBatch with the canonical column names.
pub fn panel_to_record_batch(panel: &Panel) -> Result<RecordBatch, ReadError> {
    let rows = panel.rows();
    let schema = Arc::new(Schema::new(vec![
        Field::new("firm_id", DataType::Utf8, false),
        Field::new("firm_name", DataType::Utf8, false),
        Field::new("country_code", DataType::Utf8, false),
        Field::new("country_name", DataType::Utf8, false),
        Field::new("treated_country", DataType::Boolean, false),
        Field::new("treated", DataType::Boolean, false),
        Field::new("time_to_treatment", DataType::Int64, false),
        Field::new("year", DataType::Int32, false),
        Field::new("roa", DataType::Float64, true),
        Field::new("avg_total_assets", DataType::Float64, true),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.firm_id.as_str()))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.firm_name.as_str()))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.country_code.as_str()))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.country_name.as_str()))),
        Arc::new(BooleanArray::from(rows.iter().map(|r| r.treated_country).collect::<Vec<_>>())),
        Arc::new(BooleanArray::from(rows.iter().map(|r| r.treated).collect::<Vec<_>>())),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.time_to_treatment))),
        Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.year))),
        Arc::new(Float64Array::from(rows.iter().map(|r| r.roa).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(rows.iter().map(|r| r.avg_total_assets).collect::<Vec<_>>())),
    ];
    Ok(RecordBatch::try_new(schema, columns)?)
}

fn extract_panel_rows(
    batch: &RecordBatch,
    rows: &mut Vec<PanelObservation>,
) -> Result<(), ReadError> {
    let firm_id = utf8_column(batch, &["firm_id", "gvkey"])?;
    let firm_name = utf8_column(batch, &["firm_name", "conm"])?;
    let country_code = utf8_column(batch, &["country_code", "country"])?;
    let country_name = utf8_column(batch, &["country_name"])?;
    let treated_country = bool_column(batch, &["treated_country", "tment"])?;
    let treated = bool_column(batch, &["treated"])?;
    let time_to_treatment = i64_column(batch, &["time_to_treatment", "time_to_treat"])?;
    let year = i64_column(batch, &["year", "fyear"])?;
    let roa = optional_f64_column(batch, &["roa"])?;
    let avg_total_assets = optional_f64_column(batch, &["avg_total_assets", "avg_at"])?;

    for i in 0..batch.num_rows() {
        let y = i32::try_from(year[i]).map_err(|_| ReadError::WrongType {
            col: "year".into(),
            expected: "32-bit year".into(),
            actual: year[i].to_string(),
        })?;
        rows.push(PanelObservation {
            firm_id: firm_id[i].clone(),
            firm_name: firm_name[i].clone(),
            country_code: country_code[i].clone(),
            country_name: country_name[i].clone(),
            treated_country: treated_country[i],
            treated: treated[i],
            time_to_treatment: time_to_treatment[i],
            year: y,
            roa: roa.as_ref().and_then(|c| c[i]),
            avg_total_assets: avg_total_assets.as_ref().and_then(|c| c[i]),
        });
    }
    Ok(())
}

fn extract_simulation_rows(
    batch: &RecordBatch,
    rows: &mut Vec<SimulationRow>,
) -> Result<(), ReadError> {
    let run = i64_column(batch, &["run"])?;
    let model = utf8_column(batch, &["model"])?;
    let cluster = utf8_column(batch, &["cluster"])?;
    let winsorize = utf8_column(batch, &["winsorize"])?;
    let true_effect = f64_column(batch, &["true_effect"])?;
    let estimate = f64_column(batch, &["estimate"])?;
    let ci_lower = f64_column(batch, &["ci_lower"])?;
    let ci_upper = f64_column(batch, &["ci_upper"])?;

    for i in 0..batch.num_rows() {
        let run_id = u32::try_from(run[i]).map_err(|_| ReadError::WrongType {
            col: "run".into(),
            expected: "non-negative 32-bit run id".into(),
            actual: run[i].to_string(),
        })?;
        rows.push(SimulationRow {
            run: run_id,
            model: model[i].clone(),
            cluster: cluster[i].clone(),
            winsorize: winsorize[i].clone(),
            true_effect: true_effect[i],
            estimate: estimate[i],
            ci_lower: ci_lower[i],
            ci_upper: ci_upper[i],
        });
    }
    Ok(())
}

/// First column present under any of `names`, cast to `to`.
fn find_cast(
    batch: &RecordBatch,
    names: &[&str],
    to: &DataType,
) -> Result<Option<(String, ArrayRef)>, ReadError> {
    let schema = batch.schema();
    for &name in names {
        if let Ok(idx) = schema.index_of(name) {
            let col = batch.column(idx);
            let casted = cast(col.as_ref(), to).map_err(|_| ReadError::WrongType {
                col: name.into(),
                expected: format!("{to:?}"),
                actual: format!("{:?}", col.data_type()),
            })?;
            return Ok(Some((name.to_string(), casted)));
        }
    }
    Ok(None)
}

fn require(
    batch: &RecordBatch,
    names: &[&str],
    to: &DataType,
) -> Result<(String, ArrayRef), ReadError> {
    find_cast(batch, names, to)?.ok_or_else(|| ReadError::MissingColumn(names[0].into()))
}

fn check_no_nulls(name: &str, arr: &dyn Array) -> Result<(), ReadError> {
    if arr.null_count() > 0 {
        let row = (0..arr.len()).find(|&i| arr.is_null(i)).unwrap_or(0);
        return Err(ReadError::NullValue { row, col: name.into() });
    }
    Ok(())
}

fn utf8_column(batch: &RecordBatch, names: &[&str]) -> Result<Vec<String>, ReadError> {
    let (name, arr) = require(batch, names, &DataType::Utf8)?;
    check_no_nulls(&name, arr.as_ref())?;
    Ok(arr.as_string::<i32>().iter().map(|v| v.unwrap_or_default().to_string()).collect())
}

fn bool_column(batch: &RecordBatch, names: &[&str]) -> Result<Vec<bool>, ReadError> {
    let (name, arr) = require(batch, names, &DataType::Boolean)?;
    check_no_nulls(&name, arr.as_ref())?;
    Ok(arr.as_boolean().iter().map(|v| v.unwrap_or(false)).collect())
}

fn i64_column(batch: &RecordBatch, names: &[&str]) -> Result<Vec<i64>, ReadError> {
    let (name, arr) = require(batch, names, &DataType::Int64)?;
    check_no_nulls(&name, arr.as_ref())?;
    Ok(arr.as_primitive::<Int64Type>().values().to_vec())
}

fn f64_column(batch: &RecordBatch, names: &[&str]) -> Result<Vec<f64>, ReadError> {
    let (name, arr) = require(batch, names, &DataType::Float64)?;
    check_no_nulls(&name, arr.as_ref())?;
    Ok(arr.as_primitive::<Float64Type>().values().to_vec())
}

/// Nullable float column; `Ok(None)` when the column is absent. NaN reads as
/// missing, infinities are rejected.
fn optional_f64_column(
    batch: &RecordBatch,
    names: &[&str],
) -> Result<Option<Vec<Option<f64>>>, ReadError> {
    let Some((name, arr)) = find_cast(batch, names, &DataType::Float64)? else {
        return Ok(None);
    };
    arr.as_primitive::<Float64Type>()
        .iter()
        .enumerate()
        .map(|(row, v)| match v {
            Some(x) if x.is_infinite() => Err(ReadError::Invalid(dl_core::Error::Data(format!(
                "row {row}: column '{name}' has non-finite value {x}"
            )))),
            Some(x) if x.is_nan() => Ok(None),
            other => Ok(other),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::test_support::obs;
    use crate::observation::NumericColumn;

    fn tmp_path(name: &str) -> std::path::PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("didlab_{}_{}_{}", std::process::id(), nanos, name))
    }

    #[test]
    fn panel_parquet_roundtrip_keeps_missing_values() {
        let mut a = obs("A", "DEU", true, 2003, 0.04);
        a.roa = None;
        let panel = Panel::new(vec![a, obs("B", "FRA", false, 2003, -0.02)]).unwrap();

        let path = tmp_path("panel.parquet");
        write_panel_parquet(&path, &panel).unwrap();
        let back = read_panel_parquet(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(back, panel);
        assert_eq!(back.column(NumericColumn::Roa), vec![None, Some(-0.02)]);
    }

    #[test]
    fn infinite_outcome_is_rejected() {
        let mut a = obs("A", "DEU", true, 2003, 0.04);
        a.roa = Some(f64::INFINITY);
        let panel = Panel::new(vec![a, obs("B", "FRA", false, 2003, -0.02)]).unwrap();

        let path = tmp_path("panel_inf.parquet");
        write_panel_parquet(&path, &panel).unwrap();
        let res = read_panel_parquet(&path);
        std::fs::remove_file(&path).ok();

        match res {
            Err(ReadError::Invalid(e)) => assert!(e.to_string().contains("non-finite"), "{e}"),
            other => panic!("expected invalid data, got {:?}", other.map(|p| p.len())),
        }
    }

    #[test]
    fn r_style_integer_columns_are_cast() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("gvkey", DataType::Utf8, false),
            Field::new("conm", DataType::Utf8, false),
            Field::new("country", DataType::Utf8, false),
            Field::new("country_name", DataType::Utf8, false),
            Field::new("tment", DataType::Int32, false),
            Field::new("treated", DataType::Int32, false),
            Field::new("time_to_treat", DataType::Int32, false),
            Field::new("fyear", DataType::Float64, false),
            Field::new("roa", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["001"])),
                Arc::new(StringArray::from(vec!["Alpha"])),
                Arc::new(StringArray::from(vec!["DEU"])),
                Arc::new(StringArray::from(vec!["Germany"])),
                Arc::new(Int32Array::from(vec![1])),
                Arc::new(Int32Array::from(vec![0])),
                Arc::new(Int32Array::from(vec![-2])),
                Arc::new(Float64Array::from(vec![2001.0])),
                Arc::new(Float64Array::from(vec![Some(0.07)])),
            ],
        )
        .unwrap();

        let mut rows = Vec::new();
        extract_panel_rows(&batch, &mut rows).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].treated_country);
        assert!(!rows[0].treated);
        assert_eq!(rows[0].year, 2001);
        assert_eq!(rows[0].time_to_treatment, -2);
        assert_eq!(rows[0].avg_total_assets, None);
    }

    #[test]
    fn missing_required_column_is_reported() {
        let schema = Arc::new(Schema::new(vec![Field::new("run", DataType::Int64, false)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1_i64]))]).unwrap();
        let mut rows = Vec::new();
        match extract_simulation_rows(&batch, &mut rows) {
            Err(ReadError::MissingColumn(c)) => assert_eq!(c, "model"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn simulation_parquet_roundtrip() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("run", DataType::Int32, false),
            Field::new("model", DataType::Utf8, false),
            Field::new("cluster", DataType::Utf8, false),
            Field::new("winsorize", DataType::Boolean, false),
            Field::new("true_effect", DataType::Float64, false),
            Field::new("estimate", DataType::Float64, false),
            Field::new("ci_lower", DataType::Float64, false),
            Field::new("ci_upper", DataType::Float64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec!["twfe", "twfe"])),
                Arc::new(StringArray::from(vec!["firm", "firm"])),
                Arc::new(BooleanArray::from(vec![true, false])),
                Arc::new(Float64Array::from(vec![0.01, 0.01])),
                Arc::new(Float64Array::from(vec![0.011, 0.009])),
                Arc::new(Float64Array::from(vec![0.001, -0.001])),
                Arc::new(Float64Array::from(vec![0.021, 0.019])),
            ],
        )
        .unwrap();

        let path = tmp_path("sims.parquet");
        write_parquet(&path, &[batch]).unwrap();
        let rows = read_simulation_parquet(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].winsorize, "true");
        assert_eq!(rows[1].run, 2);
        assert_eq!(rows[1].ci_lower, -0.001);
    }
}
