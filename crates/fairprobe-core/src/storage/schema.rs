pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  status TEXT NOT NULL,
  started_at TEXT NOT NULL,
  ended_at TEXT,
  config_fingerprint TEXT NOT NULL,
  config_json TEXT NOT NULL,
  pair_ids_json TEXT NOT NULL DEFAULT '[]',
  error TEXT
);

CREATE TABLE IF NOT EXISTS probes (
  run_id TEXT NOT NULL REFERENCES runs(id),
  probe_id TEXT NOT NULL,
  pair_id TEXT NOT NULL,
  group_label TEXT NOT NULL,
  content TEXT NOT NULL,
  fields_json TEXT NOT NULL,
  created_at TEXT NOT NULL,
  PRIMARY KEY (run_id, probe_id)
);

CREATE TABLE IF NOT EXISTS responses (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  run_id TEXT NOT NULL REFERENCES runs(id),
  probe_id TEXT NOT NULL,
  pair_id TEXT NOT NULL,
  group_label TEXT NOT NULL,
  text TEXT,
  redacted INTEGER NOT NULL DEFAULT 0,
  latency_ms INTEGER NOT NULL,
  attempts INTEGER NOT NULL,
  received_at TEXT NOT NULL,
  UNIQUE (run_id, probe_id)
);

CREATE TABLE IF NOT EXISTS failures (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  run_id TEXT NOT NULL REFERENCES runs(id),
  probe_id TEXT NOT NULL,
  pair_id TEXT NOT NULL,
  group_label TEXT NOT NULL,
  reason TEXT NOT NULL,
  attempts INTEGER NOT NULL,
  recorded_at TEXT NOT NULL,
  UNIQUE (run_id, probe_id)
);

CREATE TABLE IF NOT EXISTS metrics (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  run_id TEXT NOT NULL REFERENCES runs(id),
  probe_id TEXT NOT NULL,
  group_label TEXT NOT NULL,
  values_json TEXT NOT NULL,
  extracted_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS reports (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  run_id TEXT NOT NULL REFERENCES runs(id),
  created_at TEXT NOT NULL,
  report_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_responses_run ON responses(run_id);
CREATE INDEX IF NOT EXISTS idx_metrics_run ON metrics(run_id, probe_id);
"#;
