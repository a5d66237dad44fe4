//! The ObsSpace front end and its load/save orchestration.
//!
//! Loading runs backend -> scanner -> distribution -> time filter ->
//! projection -> container; every loaded variable ends up aligned to the
//! same owned index list, read-only. Saving walks the container in
//! by-variable order and writes each record as `variable@group`.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use obs_engines::{
    create_backend, open_backend, Backend, BackendSpec, CreateMode, EngineError, OpenMode,
};
use obs_store::{
    AccessMode, ObsScalar, ObsSpaceContainer, RecordView, StoreOptions, ValueCell,
};

use crate::comm::Comm;
use crate::config::{EngineOptions, ObsConfig};
use crate::distribution::create_distribution;
use crate::error::{IngestError, IngestResult};
use crate::scanner;
use crate::time_window::{
    apply_window, decode_reference, obs_times, substitute_missing, TimeWindow,
};

/// Group given to flat variables whose on-disk name carries no `@group`.
pub const GROUP_UNDEFINED: &str = "GroupUndefined";

/// In-memory, typed, group/variable-addressed observation database for
/// one rank.
pub struct ObsSpace {
    obsname: String,
    window: TimeWindow,
    comm: Comm,
    engine: EngineOptions,
    container: ObsSpaceContainer,
    owned_index: Vec<usize>,
    nlocs: usize,
    nvars: usize,
    nrecs: usize,
    nobs: usize,
    out_path: Option<PathBuf>,
}

impl ObsSpace {
    /// Build an ObsSpace from a validated config, loading the input file
    /// when one is configured.
    pub fn from_config(config: &ObsConfig, comm: Comm) -> IngestResult<Self> {
        config.validate()?;
        let window = TimeWindow::new(config.window.begin, config.window.end);
        let mut space = ObsSpace {
            obsname: config.obs_type.clone(),
            window,
            comm,
            engine: config.engine.clone(),
            container: ObsSpaceContainer::new(),
            owned_index: Vec::new(),
            nlocs: 0,
            nvars: 1,
            nrecs: 0,
            nobs: 0,
            out_path: config.obsdataout.as_ref().map(|f| f.obsfile.clone()),
        };
        if let Some(input) = &config.obsdatain {
            space.load(&input.obsfile, &config.distribution)?;
        }
        Ok(space)
    }

    /// An empty ObsSpace with no backing file.
    pub fn empty(obsname: &str, window: TimeWindow, comm: Comm) -> Self {
        ObsSpace {
            obsname: obsname.to_string(),
            window,
            comm,
            engine: EngineOptions::default(),
            container: ObsSpaceContainer::new(),
            owned_index: Vec::new(),
            nlocs: 0,
            nvars: 1,
            nrecs: 0,
            nobs: 0,
            out_path: None,
        }
    }

    /// Partition `global_nlocs` synthetic locations across the
    /// communicator without reading a file.
    pub fn generate_distribution(&mut self, global_nlocs: usize, name: &str) -> IngestResult<()> {
        let dist = create_distribution(name, self.comm, global_nlocs, None)?;
        self.owned_index = dist.index().to_vec();
        self.nlocs = dist.size();
        self.nrecs = self.nlocs;
        self.nobs = self.nlocs * self.nvars;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Load path
    // ------------------------------------------------------------------

    fn load(&mut self, path: &Path, distribution: &str) -> IngestResult<()> {
        info!(obsname = %self.obsname, path = %path.display(), "loading obs file");
        let spec = self.backend_spec_for(path);
        let backend = open_backend(&spec, OpenMode::ReadOnly)?;
        let report = scanner::scan(backend.as_ref())?;

        // Files that group locations into atomic records carry a
        // per-location record-number variable; distributing over it keeps
        // whole records on one rank.
        let records = read_record_grouping(backend.as_ref(), report.nlocs)?;
        let mut dist = create_distribution(
            distribution,
            self.comm,
            report.nlocs,
            records.as_deref(),
        )?;

        // Time filter: drives the distribution's erase and yields the
        // derived integer date/time fields. A file without the reference
        // attribute keeps every observation.
        let derived = if backend.has_attr("date_time") {
            let reference = match backend.read_attr("date_time")? {
                ValueCell::Int(v) if !v.is_empty() => decode_reference(v[0])?,
                _ => {
                    return Err(IngestError::InvalidConfig(
                        "date_time attribute is not an integer scalar".to_string(),
                    ))
                }
            };
            let offsets = read_time_offsets(backend.as_ref())?;
            if offsets.len() < report.nlocs {
                return Err(IngestError::InvalidConfig(format!(
                    "time variable has {} entries for {} locations",
                    offsets.len(),
                    report.nlocs
                )));
            }
            let times = obs_times(reference, &offsets);
            Some(apply_window(dist.as_mut(), &times, &self.window))
        } else {
            debug!("reference date_time attribute not found; keeping all observations");
            None
        };

        let owned = dist.index().to_vec();
        let read_only = StoreOptions {
            append: false,
            mode: AccessMode::ReadOnly,
            locations_dimensioned: true,
        };

        for (name, var_info) in &report.vars {
            if report.dim_var_list.contains(name) || !report.is_locations_dimensioned(name) {
                continue;
            }
            let (vname, gname) = split_flat_name(name);

            // The derived fields stand in for the on-disk time offsets.
            if let Some(derived) = &derived {
                if vname.starts_with("time") {
                    self.container.insert_cell(
                        gname,
                        vname,
                        &[owned.len()],
                        ValueCell::Int(derived.time.clone()),
                        read_only,
                    )?;
                    self.container.insert_cell(
                        gname,
                        "date",
                        &[owned.len()],
                        ValueCell::Int(derived.date.clone()),
                        read_only,
                    )?;
                    continue;
                }
            }

            let column = backend.read_var(name)?;
            let row_len: usize = var_info.shape[1..].iter().product::<usize>().max(1);
            if let Some(&max) = owned.last() {
                if (max + 1) * row_len > column.len() {
                    return Err(IngestError::InvalidConfig(format!(
                        "variable '{}' has {} elements, fewer than the locations axis requires",
                        name,
                        column.len()
                    )));
                }
            }

            let mut cell = project_rows(&column, &owned, row_len);
            if let ValueCell::Float(values) = &mut cell {
                let substituted = substitute_missing(values);
                if substituted > 0 {
                    debug!(variable = %name, substituted, "substituted missing values");
                }
            }

            let mut shape = vec![owned.len()];
            shape.extend_from_slice(&var_info.shape[1..]);
            self.container.insert_cell(gname, vname, &shape, cell, read_only)?;
        }

        self.owned_index = owned;
        self.nlocs = self.owned_index.len();
        self.nvars = report.nvars;
        self.nrecs = report.nrecs.unwrap_or(self.nlocs);
        self.nobs = self.nlocs * self.nvars;
        info!(
            nlocs = self.nlocs,
            nvars = self.nvars,
            variables = self.container.len(),
            "obs file loaded"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Save path
    // ------------------------------------------------------------------

    /// Persist the container to `path`, truncating any existing file.
    ///
    /// Dimensions are defined from the current axis sizes first; variables
    /// are then written in by-variable order as `variable@group`,
    /// preserving shape and type tag. Variables the backend cannot
    /// represent are skipped with a warning.
    pub fn save(&self, path: &Path) -> IngestResult<()> {
        info!(obsname = %self.obsname, path = %path.display(), "saving obs space");
        let spec = self.backend_spec_for(path);
        let mut backend = create_backend(&spec, CreateMode::Truncate)?;

        backend.define_dimension("nlocs", self.nlocs)?;
        backend.define_dimension("nobs", self.nobs)?;
        backend.define_dimension("nrecs", self.nrecs)?;
        backend.define_dimension("nvars", self.nvars)?;
        let mut defined: BTreeSet<String> =
            ["nlocs", "nobs", "nrecs", "nvars"].iter().map(|s| s.to_string()).collect();

        for view in self.container.by_variable() {
            let flat = flat_name(view.variable, view.group);
            let dims = self.dim_names_for(&view);
            for dim in &dims {
                if !defined.contains(dim) {
                    let extent = dim
                        .strip_prefix("len")
                        .and_then(|s| s.parse::<usize>().ok())
                        .unwrap_or(0);
                    backend.define_dimension(dim, extent)?;
                    defined.insert(dim.clone());
                }
            }
            let dim_refs: Vec<&str> = dims.iter().map(String::as_str).collect();

            match backend.create_var(&flat, view.dtype, &dim_refs) {
                Ok(()) => {
                    let cell = self.container.cell_of(view.group, view.variable)?;
                    backend.write_var(&flat, cell)?;
                }
                Err(EngineError::UnsupportedDtype { .. }) => {
                    warn!(variable = %flat, dtype = %view.dtype, "backend cannot store this type; skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Save to the output file named in the configuration.
    pub fn save_configured(&self) -> IngestResult<()> {
        match &self.out_path {
            Some(path) => self.save(path),
            None => Err(IngestError::InvalidConfig(
                "no obsdataout file configured".to_string(),
            )),
        }
    }

    fn dim_names_for(&self, view: &RecordView<'_>) -> Vec<String> {
        let mut dims = Vec::with_capacity(view.shape.len());
        for (position, &extent) in view.shape.iter().enumerate() {
            let name = if position == 0 && extent == self.nlocs {
                "nlocs".to_string()
            } else if extent == self.nvars {
                "nvars".to_string()
            } else {
                format!("len{}", extent)
            };
            dims.push(name);
        }
        dims
    }

    fn backend_spec_for(&self, path: &Path) -> BackendSpec {
        match BackendSpec::for_path(path) {
            BackendSpec::Hdf5File { path, .. } => BackendSpec::Hdf5File {
                path,
                compat: self.engine.compatibility_range,
            },
            other => other,
        }
    }

    // ------------------------------------------------------------------
    // Typed database access
    // ------------------------------------------------------------------

    pub fn has(&self, group: &str, variable: &str) -> bool {
        self.container.has(group, variable)
    }

    /// Read the whole variable into `out`; the buffer length is the
    /// expected element count.
    pub fn get_db<T: ObsScalar>(
        &self,
        group: &str,
        variable: &str,
        out: &mut [T],
    ) -> IngestResult<()> {
        self.container.load_all(group, variable, out).map_err(Into::into)
    }

    /// Create or overwrite a rank-1 variable.
    pub fn put_db<T: ObsScalar>(
        &mut self,
        group: &str,
        variable: &str,
        data: &[T],
    ) -> IngestResult<()> {
        let locations_dimensioned = self.nlocs > 0 && data.len() == self.nlocs;
        self.container
            .store_with(
                group,
                variable,
                &[data.len()],
                data,
                StoreOptions {
                    append: false,
                    mode: AccessMode::ReadWrite,
                    locations_dimensioned,
                },
            )
            .map_err(Into::into)
    }

    /// Store a shaped variable, optionally growing its leading extent.
    pub fn store_to_db<T: ObsScalar>(
        &mut self,
        group: &str,
        variable: &str,
        shape: &[usize],
        data: &[T],
        append: bool,
    ) -> IngestResult<()> {
        let locations_dimensioned = self.nlocs > 0 && shape.first() == Some(&self.nlocs);
        self.container
            .store_with(
                group,
                variable,
                shape,
                data,
                StoreOptions {
                    append,
                    mode: AccessMode::ReadWrite,
                    locations_dimensioned,
                },
            )
            .map_err(Into::into)
    }

    /// Partial read along the leading axis.
    pub fn load_from_db<T: ObsScalar>(
        &self,
        group: &str,
        variable: &str,
        shape: &[usize],
        out: &mut [T],
        start: usize,
        count: Option<usize>,
    ) -> IngestResult<()> {
        self.container
            .load(group, variable, shape, out, start, count)
            .map_err(Into::into)
    }

    /// Remove a variable record.
    pub fn remove(&mut self, group: &str, variable: &str) -> IngestResult<()> {
        self.container.remove(group, variable).map_err(Into::into)
    }

    // ------------------------------------------------------------------
    // Views and sizes
    // ------------------------------------------------------------------

    pub fn obsname(&self) -> &str {
        &self.obsname
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        self.window.begin()
    }

    pub fn window_end(&self) -> DateTime<Utc> {
        self.window.end()
    }

    pub fn comm(&self) -> Comm {
        self.comm
    }

    /// Global indices this rank owns, in stable order.
    pub fn index(&self) -> &[usize] {
        &self.owned_index
    }

    pub fn nlocs(&self) -> usize {
        self.nlocs
    }

    pub fn nvars(&self) -> usize {
        self.nvars
    }

    pub fn nrecs(&self) -> usize {
        self.nrecs
    }

    pub fn nobs(&self) -> usize {
        self.nobs
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.out_path.as_deref()
    }

    pub fn by_insertion(&self) -> impl Iterator<Item = RecordView<'_>> + '_ {
        self.container.by_insertion()
    }

    pub fn by_group(&self) -> impl Iterator<Item = RecordView<'_>> + '_ {
        self.container.by_group()
    }

    pub fn by_variable(&self) -> impl Iterator<Item = RecordView<'_>> + '_ {
        self.container.by_variable()
    }
}

impl fmt::Display for ObsSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ObsSpace: {} ({} locations)", self.obsname, self.nlocs)?;
        write!(f, "{}", self.container)
    }
}

/// Split an on-disk `variable@group` name into `(variable, group)`.
fn split_flat_name(name: &str) -> (&str, &str) {
    match name.split_once('@') {
        Some((variable, group)) if !group.is_empty() => (variable, group),
        _ => (name, GROUP_UNDEFINED),
    }
}

/// Rebuild the on-disk name from a record key.
fn flat_name(variable: &str, group: &str) -> String {
    if group == GROUP_UNDEFINED {
        variable.to_string()
    } else {
        format!("{}@{}", variable, group)
    }
}

/// Project whole rows of a column onto the owned location indices.
fn project_rows(column: &ValueCell, owned: &[usize], row_len: usize) -> ValueCell {
    if row_len == 1 {
        column.project(owned)
    } else {
        let mut element_indices = Vec::with_capacity(owned.len() * row_len);
        for &row in owned {
            element_indices.extend(row * row_len..(row + 1) * row_len);
        }
        column.project(&element_indices)
    }
}

/// Per-location record ids, when the file carries a grouping variable.
fn read_record_grouping(
    backend: &dyn Backend,
    nlocs: usize,
) -> IngestResult<Option<Vec<usize>>> {
    let name = if backend.var_exists("record_number@MetaData") {
        "record_number@MetaData"
    } else if backend.var_exists("record_number") {
        "record_number"
    } else {
        return Ok(None);
    };
    match backend.read_var(name)? {
        ValueCell::Int(ids) => {
            if ids.len() < nlocs {
                return Err(IngestError::InvalidConfig(format!(
                    "record grouping variable '{}' has {} entries for {} locations",
                    name,
                    ids.len(),
                    nlocs
                )));
            }
            let mut records = Vec::with_capacity(nlocs);
            for &id in &ids[..nlocs] {
                if id < 0 {
                    return Err(IngestError::InvalidConfig(format!(
                        "record grouping variable '{}' contains negative id {}",
                        name, id
                    )));
                }
                records.push(id as usize);
            }
            debug!(variable = name, "distributing over record grouping");
            Ok(Some(records))
        }
        other => Err(IngestError::InvalidConfig(format!(
            "record grouping variable '{}' has type {}, expected int",
            name,
            other.dtype()
        ))),
    }
}

fn read_time_offsets(backend: &dyn Backend) -> IngestResult<Vec<f32>> {
    let name = if backend.var_exists("time") {
        "time"
    } else if backend.var_exists("time@MetaData") {
        "time@MetaData"
    } else {
        return Err(IngestError::InvalidConfig(
            "file has a date_time attribute but no time variable".to_string(),
        ));
    };
    match backend.read_var(name)? {
        ValueCell::Float(offsets) => Ok(offsets),
        other => Err(IngestError::InvalidConfig(format!(
            "time variable has type {}, expected float",
            other.dtype()
        ))),
    }
}
