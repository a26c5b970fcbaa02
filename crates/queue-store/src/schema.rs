//! Postgres DDL for the optimization tables

pub const CREATE_SESSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS optimization_session (
    id BIGINT PRIMARY KEY,
    tenant_id BIGINT NOT NULL,
    billing_period_id BIGINT NOT NULL,
    status VARCHAR(32) NOT NULL DEFAULT 'ACTIVE',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_INSTANCE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS optimization_instance (
    id BIGINT PRIMARY KEY,
    session_id BIGINT NOT NULL REFERENCES optimization_session(id),
    service_provider_id BIGINT NOT NULL,
    portal_type VARCHAR(16) NOT NULL,
    is_customer_optimization BOOLEAN NOT NULL DEFAULT FALSE,
    billing_period_start DATE NOT NULL,
    billing_period_end DATE NOT NULL
)
"#;

pub const CREATE_COMM_GROUP_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS optimization_comm_group (
    id BIGINT PRIMARY KEY,
    instance_id BIGINT NOT NULL REFERENCES optimization_instance(id),
    rate_plan_ids TEXT NOT NULL
)
"#;

pub const CREATE_QUEUE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS optimization_queue (
    id BIGINT PRIMARY KEY,
    instance_id BIGINT NOT NULL REFERENCES optimization_instance(id),
    comm_group_id BIGINT NOT NULL REFERENCES optimization_comm_group(id),
    service_provider_id BIGINT NOT NULL,
    status VARCHAR(32) NOT NULL DEFAULT 'NOT_STARTED',
    total_cost NUMERIC(18, 4),
    error_reason TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    started_at TIMESTAMPTZ,
    completed_at TIMESTAMPTZ
)
"#;

pub const CREATE_QUEUE_RATE_PLAN_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS optimization_queue_rate_plan (
    queue_id BIGINT NOT NULL REFERENCES optimization_queue(id),
    rate_plan_id BIGINT NOT NULL,
    sequence_order INT NOT NULL,
    PRIMARY KEY (queue_id, sequence_order)
)
"#;

pub const CREATE_DEVICE_RESULT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS optimization_device_result (
    id BIGSERIAL PRIMARY KEY,
    queue_id BIGINT NOT NULL REFERENCES optimization_queue(id),
    device_id BIGINT NOT NULL,
    assigned_rate_plan_id BIGINT NOT NULL,
    base_cost NUMERIC(18, 4) NOT NULL,
    overage_cost NUMERIC(18, 4) NOT NULL,
    total_cost NUMERIC(18, 4) NOT NULL
)
"#;

pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_optimization_queue_status ON optimization_queue(status)",
    "CREATE INDEX IF NOT EXISTS idx_optimization_queue_instance ON optimization_queue(instance_id)",
    "CREATE INDEX IF NOT EXISTS idx_optimization_instance_session ON optimization_instance(session_id)",
    "CREATE INDEX IF NOT EXISTS idx_optimization_device_result_queue ON optimization_device_result(queue_id)",
];

/// All statements in dependency order.
pub fn all_statements() -> Vec<&'static str> {
    let mut statements = vec![
        CREATE_SESSION_TABLE,
        CREATE_INSTANCE_TABLE,
        CREATE_COMM_GROUP_TABLE,
        CREATE_QUEUE_TABLE,
        CREATE_QUEUE_RATE_PLAN_TABLE,
        CREATE_DEVICE_RESULT_TABLE,
    ];
    statements.extend_from_slice(CREATE_INDEXES);
    statements
}
