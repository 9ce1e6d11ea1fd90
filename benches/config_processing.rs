//! 配置处理基准测试
//!
//! 测试配置解析、验证、序列化和覆盖层应用的性能

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use config_pulse::config::overrides::apply_override;
use config_pulse::config::{config_to_document, validate_config, Config};
use std::collections::HashMap;

const BENCH_CONFIG_TOML: &str = r#"
[general]
log_level = "info"
max_concurrent_runs = 8
request_timeout_seconds = 60

[llms.nim_llm]
model = "meta/llama-3.1-70b-instruct"
temperature = 0.7
max_tokens = 1024
base_url = "https://integrate.api.example.com/v1"
api_key_env = "NIM_API_KEY"

[llms.fallback_llm]
model = "meta/llama-3.1-8b-instruct"
temperature = 0.2

[workflow]
entry = "react_agent"
llm = "nim_llm"
description = "基准测试工作流"
"#;

/// 配置处理基准测试
fn config_processing_benchmark(c: &mut Criterion) {
    c.bench_function("config_deserialization", |b| {
        b.iter(|| {
            let config: Config = toml::from_str(BENCH_CONFIG_TOML).unwrap();
            black_box(config)
        });
    });

    c.bench_function("config_serialization", |b| {
        let config = create_bench_config();

        b.iter(|| {
            let toml = toml::to_string(&config).unwrap();
            black_box(toml)
        });
    });

    c.bench_function("config_validation", |b| {
        let config = create_bench_config();

        b.iter(|| {
            let result = validate_config(&config);
            black_box(result)
        });
    });

    c.bench_function("override_application", |b| {
        let config = create_bench_config();
        let document = config_to_document(&config).unwrap();
        let overrides: HashMap<&str, &str> = [
            ("llms.nim_llm.temperature", "0.9"),
            ("general.log_level", "debug"),
            ("general.max_concurrent_runs", "16"),
        ]
        .into_iter()
        .collect();

        b.iter(|| {
            let mut candidate = document.clone();
            for (path, value) in &overrides {
                apply_override(&mut candidate, path, value).unwrap();
            }
            black_box(candidate)
        });
    });
}

/// 创建基准测试配置
fn create_bench_config() -> Config {
    toml::from_str(BENCH_CONFIG_TOML).unwrap()
}

criterion_group!(benches, config_processing_benchmark);
criterion_main!(benches);
