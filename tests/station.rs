use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use rinex_fetch::domain::StationId;
use rinex_fetch::error::RinexError;
use rinex_fetch::station::{JsonStationDatabase, StationDatabase};

#[test]
fn load_station_database_from_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("stations.json");
    fs::write(
        &path,
        r#"{"mchl": {"lat": -26.3589, "lon": 148.1448, "height": 534.0}}"#,
    )
    .unwrap();
    let path = Utf8PathBuf::from_path_buf(path).unwrap();

    let database = JsonStationDatabase::load(&path).unwrap();
    let station: StationId = "MCHL".parse().unwrap();
    let coordinates = database.require(&station).unwrap();
    assert_eq!(coordinates.lat, -26.3589);

    let unknown: StationId = "zzzz".parse().unwrap();
    assert_matches!(database.require(&unknown), Err(RinexError::StationNotFound(_)));
}

#[test]
fn missing_database_file_is_a_filesystem_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("none.json")).unwrap();
    assert_matches!(
        JsonStationDatabase::load(&path),
        Err(RinexError::Filesystem(_))
    );
}
