use uxmgr::actions::cluster::{MatrixRow, parse_matrix_row, render_matrix};

fn rows() -> (Vec<i32>, Vec<MatrixRow>) {
    let node_ids = vec![1, 2, 3];
    let rows = vec![
        MatrixRow {
            from_node_id: 1,
            cells: vec![Some(true), Some(true), Some(false)],
        },
        MatrixRow {
            from_node_id: 2,
            cells: vec![Some(true), Some(true), Some(true)],
        },
        MatrixRow {
            from_node_id: 3,
            cells: vec![None, None, None],
        },
    ];
    (node_ids, rows)
}

#[test]
fn test_table_rendering() {
    let (node_ids, rows) = rows();
    let table = render_matrix(&node_ids, &rows, false);
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0].split_whitespace().collect::<Vec<_>>(), ["1", "2", "3"]);
    assert_eq!(
        lines[1].split_whitespace().collect::<Vec<_>>(),
        ["1", "ok", "ok", "x"]
    );
    // A node whose row could not be gathered renders as unknown.
    assert_eq!(
        lines[3].split_whitespace().collect::<Vec<_>>(),
        ["3", "?", "?", "?"]
    );
}

#[test]
fn test_csv_rendering() {
    let (node_ids, rows) = rows();
    let csv = render_matrix(&node_ids, &rows, true);
    assert!(csv.contains("1,3,x\n"), "{csv}");
    assert!(csv.contains("2,3,ok\n"), "{csv}");
    assert!(csv.contains("3,1,?\n"), "{csv}");
    assert_eq!(csv.lines().count(), 9);
}

#[test]
fn test_local_row_round_trip() {
    let output = "MATRIX 2 ok ok x\n";
    let row = parse_matrix_row(output, 3).unwrap();
    assert_eq!(row.from_node_id, 2);
    assert_eq!(row.cells, vec![Some(true), Some(true), Some(false)]);
}

#[test]
fn test_parse_skips_surrounding_noise() {
    let output = "motd banner\nMATRIX 4 x ok\ntrailing\n";
    let row = parse_matrix_row(output, 2).unwrap();
    assert_eq!(row.from_node_id, 4);
    assert_eq!(row.cells, vec![Some(false), Some(true)]);
}

#[test]
fn test_parse_rejects_wrong_cell_count() {
    assert!(parse_matrix_row("MATRIX 4 ok ok\n", 3).is_none());
    assert!(parse_matrix_row("no matrix here\n", 3).is_none());
}
