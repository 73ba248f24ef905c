// Conversion of MDF4 files written to disk

mod common;

use common::{init_logging, start, write_mdf4, TestChannel, TestGroup};
use mf4_csv_core::formats::Mdf4Recording;
use mf4_csv_core::{
    ConvertError, Converter, ConverterConfig, ErrorKind, MemorySink, Recording, Sample,
    SampleShape, ValueMode,
};
use std::fs;
use std::path::{Path, PathBuf};

fn gps_file() -> Vec<u8> {
    write_mdf4(
        start(),
        &[
            TestGroup::new(&[0.0, 0.05, 0.1, 0.25])
                .with_channel(TestChannel::scalar("Lat", &[1.0, 2.0, 3.0, 4.0])),
            TestGroup::new(&[0.0, 0.1]).with_channel(TestChannel::array(
                "Acc",
                &[3],
                vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
            )),
        ],
    )
}

fn write_file(dir: &Path, name: &str, bytes: Vec<u8>) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn test_mdf4_metadata() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let input = write_file(dir.path(), "Run_GPS.mf4", gps_file());
    let recording = Mdf4Recording::open(&input).unwrap();

    assert_eq!(recording.start_time(), start());
    assert_eq!(recording.groups().len(), 2);

    let first = &recording.groups()[0];
    assert_eq!(first.cycles, 4);
    assert_eq!(first.channels[0].name, "t");
    assert_eq!(first.channels[1].name, "Lat");
    assert_eq!(recording.groups()[1].channels[1].shape, SampleShape::Vector(3));

    assert_eq!(recording.timebase(0).unwrap(), vec![0.0, 0.05, 0.1, 0.25]);
    let lat = recording.channel(0, 1, ValueMode::Physical).unwrap();
    assert_eq!(lat.samples.len(), 4);
    let acc = recording.channel(1, 1, ValueMode::Physical).unwrap();
    assert_eq!(acc.samples[1], Sample::Vector(vec![4.0, 5.0, 6.0]));
}

#[test]
fn test_conversion_rule_per_strategy() {
    init_logging();
    // Speed stores 10, 20 with the rule 100 + 2x
    let bytes = || {
        write_mdf4(
            start(),
            &[TestGroup::new(&[0.0, 0.2]).with_channel(
                TestChannel::scalar("Speed", &[10.0, 20.0]).with_linear(100.0, 2.0),
            )],
        )
    };
    let dir = tempfile::tempdir().unwrap();
    let per_group = write_file(dir.path(), "Run_XCP_AURIX.MF4", bytes());
    let per_channel = write_file(dir.path(), "Run_GPS.mf4", bytes());

    let recording = Mdf4Recording::open(&per_group).unwrap();
    let raw = recording.channel(0, 1, ValueMode::Raw).unwrap();
    assert_eq!(raw.samples, vec![Sample::Scalar(10.0), Sample::Scalar(20.0)]);
    let physical = recording.channel(0, 1, ValueMode::Physical).unwrap();
    assert_eq!(physical.samples, vec![Sample::Scalar(120.0), Sample::Scalar(140.0)]);

    let converter = Converter::mdf4(ConverterConfig::default());
    // 10 ms grid from 0 s to 0.2 s
    let table = converter.convert(&per_group).unwrap();
    let speed = &table.column("Speed").unwrap().values;
    assert_eq!(speed.len(), 21);
    assert_eq!(speed.first(), Some(&Some(10.0)));
    assert_eq!(speed.last(), Some(&Some(20.0)));

    // 100 ms grid
    let table = converter.convert(&per_channel).unwrap();
    assert_eq!(
        table.column("Speed").unwrap().values,
        vec![Some(120.0), Some(120.0), Some(140.0)]
    );
}

#[test]
fn test_oversized_array_dimension_is_read_error() {
    init_logging();
    let bytes = write_mdf4(
        start(),
        &[TestGroup::new(&[0.0, 0.2]).with_channel(
            TestChannel::array("Acc", &[1], vec![vec![1.0], vec![2.0]])
                .with_declared_dims(&[1 << 61]),
        )],
    );
    let dir = tempfile::tempdir().unwrap();
    let input = write_file(dir.path(), "Run_GPS.mf4", bytes);

    assert!(matches!(
        Mdf4Recording::open(&input),
        Err(ConvertError::Read(_))
    ));

    let sink = MemorySink::new();
    let out = dir.path().join("out");
    let converter = Converter::mdf4(ConverterConfig::default());
    assert!(converter.run(&input, dir.path(), &out, &sink).is_err());
    assert_eq!(sink.into_events()[0].kind, ErrorKind::ReadError);
}

#[test]
fn test_per_channel_file_to_csv() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let input_root = dir.path().join("fot");
    let output_root = dir.path().join("csv");
    let input = input_root.join("2021").join("Run_GPS.mf4");
    fs::create_dir_all(input.parent().unwrap()).unwrap();
    fs::write(&input, gps_file()).unwrap();

    let converter = Converter::mdf4(ConverterConfig::default());
    let output = converter
        .convert_to_csv(&input, &input_root, &output_root)
        .unwrap();

    assert_eq!(output, output_root.join("2021").join("Run_GPS.csv"));
    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "Time,Lat,Acc.0,Acc.1,Acc.2\n\
         2021-12-01 00:54:56.000000,1.0,1.0,2.0,3.0\n\
         2021-12-01 00:54:56.100000,3.0,4.0,5.0,6.0\n\
         2021-12-01 00:54:56.200000,3.0,4.0,5.0,6.0\n\
         2021-12-01 00:54:56.300000,4.0,4.0,5.0,6.0\n"
    );
}

#[test]
fn test_per_group_matrix_file() {
    let bytes = write_mdf4(
        start(),
        &[TestGroup::new(&[0.0, 0.2])
            .with_channel(TestChannel::array(
                "M",
                &[2, 3],
                vec![
                    vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
                    vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0],
                ],
            ))
            .with_channel(TestChannel::scalar("Speed", &[10.0, 20.0]))],
    );
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("Run_XCP_RCAR.MF4");
    fs::write(&input, bytes).unwrap();

    let converter = Converter::mdf4(ConverterConfig::default());
    let table = converter.convert(&input).unwrap();

    assert_eq!(
        table.column_names(),
        vec!["M.0.0", "M.0.1", "M.1.0", "M.1.1", "M.2.0", "M.2.1", "Speed"]
    );
    assert_eq!(table.len(), 2);
    assert_eq!(table.column("M.0.1").unwrap().values, vec![Some(4.0), Some(10.0)]);
    assert_eq!(table.column("M.2.0").unwrap().values, vec![Some(3.0), Some(9.0)]);
    assert_eq!(table.column("Speed").unwrap().values, vec![Some(10.0), Some(20.0)]);
}

#[test]
fn test_unreadable_files_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let garbage = dir.path().join("Run_GPS.mf4");
    fs::write(&garbage, b"not a measurement file").unwrap();

    let mut mdf3 = vec![0u8; 64];
    mdf3[0..8].copy_from_slice(b"MDF     ");
    mdf3[28..30].copy_from_slice(&330u16.to_le_bytes());
    let old = dir.path().join("Run_XCP_AURIX.MF4");
    fs::write(&old, mdf3).unwrap();

    let converter = Converter::mdf4(ConverterConfig::default());
    let sink = MemorySink::new();
    let out = dir.path().join("out");
    for input in [&garbage, &old] {
        assert!(converter.run(input, dir.path(), &out, &sink).is_err());
    }

    let events = sink.into_events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.kind == ErrorKind::ReadError));
    assert!(!out.exists());
}

#[test]
fn test_rerun_writes_identical_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("Run_GPS.mf4");
    fs::write(&input, gps_file()).unwrap();

    let converter = Converter::mdf4(ConverterConfig::default());
    let write = |root: &str| {
        let output = converter
            .convert_to_csv(&input, dir.path(), &dir.path().join(root))
            .unwrap();
        fs::read(output).unwrap()
    };
    assert_eq!(write("first"), write("second"));
    assert!(Path::new(&dir.path().join("first").join("Run_GPS.csv")).exists());
}
