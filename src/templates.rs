//! Default MARS requests for the supported reanalysis datasets.
//!
//! Each constructor builds a fresh request, so callers may modify the result
//! freely. Keyword reference: https://confluence.ecmwf.int/display/UDOC/MARS+keywords

use crate::domain::RequestSpec;

/// Surface analysis of ERA-Interim at the archived 0.75 degree grid, all four
/// analysis times, full record.
pub fn era_interim() -> RequestSpec {
    [
        ("stream", "oper"),
        ("levtype", "sfc"),
        // 2 metre temperature and sea surface temperature
        ("param", "2t/sst"),
        ("repres", "ll"),
        ("dataset", "interim"),
        ("class", "ei"),
        ("time", "00/06/12/18"),
        ("date", "1979-01-01/to/2018-02-28"),
        ("type", "an"),
        ("domain", "G"),
        ("grid", "0.75/0.75"),
        // no server-side cache copy
        ("use", "infrequent"),
        ("format", "netcdf"),
        ("target", "era-interim.nc"),
    ]
    .into_iter()
    .collect()
}

/// Ensemble data assimilation stream of CERA-20C, three-hourly analyses of
/// the first member.
pub fn cera20c() -> RequestSpec {
    [
        ("stream", "enda"),
        ("levtype", "sfc"),
        ("param", "2t"),
        ("repres", "ll"),
        ("dataset", "cera20c"),
        ("class", "ep"),
        ("step", "0"),
        ("time", "00/03/06/09/12/15/18/21"),
        ("date", "1901-01-01/to/2010-12-31"),
        ("type", "an"),
        ("domain", "G"),
        ("grid", "1.125/1.125"),
        ("use", "infrequent"),
        ("format", "netcdf"),
        ("expver", "1"),
        ("number", "0"),
        ("target", "cera-20c.nc"),
    ]
    .into_iter()
    .collect()
}
