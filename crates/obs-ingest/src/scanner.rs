//! Dimension/variable scanner.
//!
//! Walks an open backend and works out which variables are coordinates,
//! which dimensions each variable is attached to, and the axis sizes the
//! rest of the pipeline runs on. Legacy files are detected by the absence
//! of an `nrecs` dimension; for those, `nvars` comes from `nchans` (or 1)
//! and the locations axis is `nobs / nvars`.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use obs_engines::{Backend, EngineError, VarInfo};

use crate::error::{IngestError, IngestResult};

/// Names that mark a variable as a coordinate.
pub const AXIS_NAMES: &[&str] = &["nlocs", "nvars", "nobs", "nrecs", "nchans"];

/// What the scanner learned about one file.
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// Dimension name to extent, as recorded in the file.
    pub axes: BTreeMap<String, usize>,
    /// Variables that are themselves coordinates.
    pub dim_var_list: Vec<String>,
    /// Variable name to its metadata, in file order.
    pub vars: Vec<(String, VarInfo)>,
    /// True when the file predates the `nrecs` dimension.
    pub legacy: bool,
    /// Size of the locations axis the distribution runs over.
    pub nlocs: usize,
    /// Number of observed variables (channels).
    pub nvars: usize,
    /// Number of atomic records, when the file declares it.
    pub nrecs: Option<usize>,
}

impl ScanReport {
    /// Ordered dimension names attached to a variable.
    pub fn dims_attached_to_var(&self, name: &str) -> Option<&[String]> {
        self.vars
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, info)| info.dims.as_slice())
    }

    /// Whether a variable's leading axis is the locations axis.
    ///
    /// Modern files say so through the first attached dimension being
    /// `nlocs`; in legacy files every rank-1 variable is treated as
    /// locations-dimensioned.
    pub fn is_locations_dimensioned(&self, name: &str) -> bool {
        match self.vars.iter().find(|(n, _)| n == name) {
            Some((_, info)) => {
                if self.legacy {
                    info.shape.len() == 1
                } else {
                    info.dims.first().map(String::as_str) == Some("nlocs")
                }
            }
            None => false,
        }
    }

    /// Variables the ingest should load: locations-dimensioned and not
    /// coordinates, in file order.
    pub fn selectable_vars(&self) -> Vec<&str> {
        self.vars
            .iter()
            .map(|(name, _)| name.as_str())
            .filter(|name| {
                !self.dim_var_list.iter().any(|d| d == name)
                    && self.is_locations_dimensioned(name)
            })
            .collect()
    }
}

/// Scan an open backend.
pub fn scan(backend: &dyn Backend) -> IngestResult<ScanReport> {
    let axes: BTreeMap<String, usize> = backend.dimensions()?.into_iter().collect();
    let legacy = !axes.contains_key("nrecs");

    let mut vars = Vec::new();
    let mut dim_var_list = Vec::new();
    for name in backend.var_names()? {
        let info = match backend.var_info(&name) {
            Ok(info) => info,
            Err(EngineError::UnsupportedSourceType { .. }) => {
                warn!(variable = %name, "skipping variable of unsupported type");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if AXIS_NAMES.contains(&name.as_str()) {
            dim_var_list.push(name.clone());
        }
        vars.push((name, info));
    }

    let (nlocs, nvars, nrecs) = if legacy {
        legacy_axis_rule(&axes)?
    } else {
        let nlocs = *axes.get("nlocs").ok_or_else(|| {
            IngestError::InvalidConfig("file has nrecs but no nlocs dimension".to_string())
        })?;
        let nvars = axes.get("nvars").copied().unwrap_or(1);
        (nlocs, nvars, axes.get("nrecs").copied())
    };

    debug!(legacy, nlocs, nvars, variables = vars.len(), "scanned obs file");
    Ok(ScanReport {
        axes,
        dim_var_list,
        vars,
        legacy,
        nlocs,
        nvars,
        nrecs,
    })
}

/// Axis sizes for files that predate the `nrecs` dimension:
/// `nvars = nchans` when present else 1, locations axis `nobs / nvars`.
fn legacy_axis_rule(axes: &BTreeMap<String, usize>) -> IngestResult<(usize, usize, Option<usize>)> {
    let nobs = *axes.get("nobs").ok_or_else(|| {
        IngestError::InvalidConfig("legacy file is missing the nobs dimension".to_string())
    })?;
    let nvars = axes.get("nchans").copied().unwrap_or(1);
    if nvars == 0 || nobs % nvars != 0 {
        return Err(IngestError::InvalidConfig(format!(
            "nobs ({}) is not divisible by nvars ({})",
            nobs, nvars
        )));
    }
    Ok((nobs / nvars, nvars, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use obs_engines::MemoryBackend;
    use obs_store::ObsDtype;

    fn legacy_backend() -> MemoryBackend {
        let mut be = MemoryBackend::new();
        be.define_dimension("nobs", 20).unwrap();
        be.define_dimension("nchans", 4).unwrap();
        be.create_var("brightness_temperature@ObsValue", ObsDtype::Float, &["nobs"])
            .unwrap();
        be.create_var("time", ObsDtype::Float, &["nobs"]).unwrap();
        be
    }

    #[test]
    fn test_legacy_rule_with_channels() {
        let be = legacy_backend();
        let report = scan(&be).unwrap();
        assert!(report.legacy);
        assert_eq!(report.nlocs, 5);
        assert_eq!(report.nvars, 4);
        assert!(report.is_locations_dimensioned("brightness_temperature@ObsValue"));
    }

    #[test]
    fn test_legacy_rule_without_channels() {
        let mut be = MemoryBackend::new();
        be.define_dimension("nobs", 7).unwrap();
        let report = scan(&be).unwrap();
        assert_eq!(report.nlocs, 7);
        assert_eq!(report.nvars, 1);
    }

    #[test]
    fn test_legacy_non_divisible_fails_fast() {
        let mut be = MemoryBackend::new();
        be.define_dimension("nobs", 10).unwrap();
        be.define_dimension("nchans", 3).unwrap();
        assert!(matches!(
            scan(&be),
            Err(IngestError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_modern_file_reads_nlocs_directly() {
        let mut be = MemoryBackend::new();
        be.define_dimension("nlocs", 9).unwrap();
        be.define_dimension("nrecs", 9).unwrap();
        be.define_dimension("nvars", 2).unwrap();
        be.create_var("t@ObsValue", ObsDtype::Float, &["nlocs"]).unwrap();
        be.create_var("lat@MetaData", ObsDtype::Float, &["nlocs"]).unwrap();
        be.create_var("chan@VarMetaData", ObsDtype::Int, &["nvars"]).unwrap();

        let report = scan(&be).unwrap();
        assert!(!report.legacy);
        assert_eq!(report.nlocs, 9);
        assert_eq!(report.nvars, 2);
        assert_eq!(report.nrecs, Some(9));
        assert!(report.is_locations_dimensioned("t@ObsValue"));
        assert!(!report.is_locations_dimensioned("chan@VarMetaData"));

        let selectable = report.selectable_vars();
        assert!(selectable.contains(&"t@ObsValue"));
        assert!(!selectable.contains(&"chan@VarMetaData"));
    }

    #[test]
    fn test_coordinate_vars_are_listed_not_selected() {
        let mut be = MemoryBackend::new();
        be.define_dimension("nobs", 4).unwrap();
        be.create_var("nobs", ObsDtype::Int, &["nobs"]).unwrap();
        be.create_var("p@ObsValue", ObsDtype::Float, &["nobs"]).unwrap();

        let report = scan(&be).unwrap();
        assert_eq!(report.dim_var_list, vec!["nobs".to_string()]);
        assert_eq!(report.selectable_vars(), vec!["p@ObsValue"]);
    }
}
