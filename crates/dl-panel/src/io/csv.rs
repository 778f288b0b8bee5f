//! CSV readers / writers.

use std::io::{Read, Write};
use std::path::Path;

use super::ReadError;
use crate::observation::{Panel, PanelObservation};
use crate::simulation::SimulationRow;

/// Parse a panel from any CSV reader (header row required).
pub fn read_panel_from<R: Read>(reader: R) -> Result<Panel, ReadError> {
    let mut rdr = ::csv::ReaderBuilder::new().trim(::csv::Trim::All).from_reader(reader);
    let rows = rdr.deserialize::<PanelObservation>().collect::<Result<Vec<_>, _>>()?;
    Ok(Panel::new(rows)?)
}

/// Read a panel CSV file.
pub fn read_panel_csv(path: &Path) -> Result<Panel, ReadError> {
    read_panel_from(std::fs::File::open(path)?)
}

/// Serialize a panel as CSV into any writer.
pub fn write_panel_to<W: Write>(writer: W, panel: &Panel) -> Result<(), ReadError> {
    let mut wtr = ::csv::Writer::from_writer(writer);
    for r in panel.rows() {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write a panel CSV file.
pub fn write_panel_csv(path: &Path, panel: &Panel) -> Result<(), ReadError> {
    write_panel_to(std::fs::File::create(path)?, panel)
}

/// Parse simulation rows from any CSV reader.
pub fn read_simulation_from<R: Read>(reader: R) -> Result<Vec<SimulationRow>, ReadError> {
    let mut rdr = ::csv::ReaderBuilder::new().trim(::csv::Trim::All).from_reader(reader);
    let rows = rdr.deserialize::<SimulationRow>().collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Read a simulation results CSV file.
pub fn read_simulation_csv(path: &Path) -> Result<Vec<SimulationRow>, ReadError> {
    read_simulation_from(std::fs::File::open(path)?)
}
