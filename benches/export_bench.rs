//! Benchmarks for cep-export
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn sample_value(i: usize) -> String {
    serde_json::json!({
        "bairro": "Centro",
        "cep": format!("{:08}", i),
        "cidade": "São Paulo",
        "codigo_ibge": "3550308",
        "logradouro": "Praça da Sé",
        "nome_origem": "Correios",
        "tipo_origem": "logradouro",
        "uf": "SP"
    })
    .to_string()
}

fn benchmark_build_row(c: &mut Criterion) {
    use cep_export::export::record::build_row;

    let value = sample_value(1_000_000);

    c.bench_function("build_row", |b| {
        b.iter(|| {
            let row = build_row(b"cep:", black_box(b"cep:01000000"), black_box(value.as_bytes()));
            black_box(row)
        })
    });
}

fn benchmark_queue_operations(c: &mut Criterion) {
    use cep_export::export::queue::{queue, KeyTask};

    c.bench_function("queue_send_recv", |b| {
        let (sender, receiver, _stats) = queue(10_000);

        b.iter(|| {
            let task = KeyTask {
                seq: 0,
                key: b"cep:01000000".to_vec(),
            };
            let _ = sender.send(task);
            black_box(receiver.recv())
        })
    });
}

fn benchmark_pipeline(c: &mut Criterion) {
    use cep_export::{ExportConfig, Exporter, MemoryStore};

    const RECORDS: usize = 50_000;

    let store: MemoryStore = (0..RECORDS)
        .map(|i| (format!("cep:{:08}", i), sample_value(i)))
        .collect();

    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(RECORDS as u64));
    group.sample_size(10);

    for workers in [1, 4, 8] {
        group.bench_function(format!("workers_{}", workers), |b| {
            b.iter(|| {
                let config = ExportConfig {
                    worker_count: workers,
                    ..ExportConfig::default()
                };
                let report = Exporter::new(&store, config)
                    .and_then(|exporter| exporter.export_to(std::io::sink()));
                black_box(report.map(|r| r.rows_written).unwrap_or(0))
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_build_row,
    benchmark_queue_operations,
    benchmark_pipeline,
);
criterion_main!(benches);
