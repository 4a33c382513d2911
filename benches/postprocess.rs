use criterion::{criterion_group, criterion_main, Criterion};
use iobtag::{
    as_iob2_format, classification_report, get_char_to_token_alignments, parse_response,
    DivByZeroStrat, Iob2Tag, TaggingConfig,
};
use pprof::criterion::{Output, PProfProfiler};

const WORDS: [&str; 8] = [
    "EU", "rejects", "German", "call", "to", "boycott", "British", "lamb",
];

fn build_sentences(n: usize) -> Vec<Vec<String>> {
    (0..n)
        .map(|i| {
            (0..20)
                .map(|j| String::from(WORDS[(i + j) % WORDS.len()]))
                .collect()
        })
        .collect()
}

fn benchmark_parse_response(c: &mut Criterion) {
    let response = "[[\"Organization\", \"EU\"], [\"Miscellaneous\", \"German\"], [Miscellaneous, \"British\"]]";
    c.bench_function("parse_response", |b| {
        b.iter(|| parse_response(Some(response)).unwrap())
    });
}

fn benchmark_as_iob2_format(c: &mut Criterion) {
    let sentences = build_sentences(1000);
    let entities = parse_response(Some(
        "[[\"Organization\", \"EU\"], [\"Miscellaneous\", \"German\"], [\"Miscellaneous\", \"British lamb\"]]",
    ))
    .unwrap();
    c.bench_function("as_iob2_format_1000_sentences", |b| {
        b.iter(|| {
            sentences
                .iter()
                .map(|tokens| as_iob2_format(tokens, &entities))
                .collect::<Vec<_>>()
        })
    });
}

fn benchmark_alignment(c: &mut Criterion) {
    let text = "大谷翔平は岩手県水沢市出身".repeat(20);
    let mut tokens = vec![String::from("[CLS]")];
    for _ in 0..20 {
        tokens.extend(
            ["大谷", "##翔", "##平", "は", "岩手", "##県", "水沢", "##市", "出身"]
                .iter()
                .map(|t| t.to_string()),
        );
    }
    tokens.push(String::from("[SEP]"));
    let config = TaggingConfig::default();
    c.bench_function("char_to_token_alignments", |b| {
        b.iter(|| get_char_to_token_alignments(&text, &tokens, &config).unwrap())
    });
}

fn benchmark_classification_report(c: &mut Criterion) {
    let sentences = build_sentences(2000);
    let entities = parse_response(Some(
        "[[\"Organization\", \"EU\"], [\"Miscellaneous\", \"German\"], [\"Person\", \"British lamb\"]]",
    ))
    .unwrap();
    let y_true: Vec<Vec<String>> = sentences
        .iter()
        .map(|tokens| {
            as_iob2_format(tokens, &entities)
                .iter()
                .map(Iob2Tag::to_string)
                .collect()
        })
        .collect();
    let y_pred: Vec<Vec<String>> = y_true
        .iter()
        .enumerate()
        .map(|(i, tags)| {
            let mut tags = tags.clone();
            if i % 3 == 0 {
                tags[0] = String::from("B-LOC");
            }
            tags
        })
        .collect();
    c.bench_function("classification_report_2000_sentences", |b| {
        b.iter(|| classification_report(&y_true, &y_pred, DivByZeroStrat::ReplaceBy0).unwrap())
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().with_profiler(PProfProfiler::new(3000, Output::Flamegraph(None)));
    targets = benchmark_parse_response, benchmark_as_iob2_format, benchmark_alignment,
        benchmark_classification_report
}
criterion_main!(benches);
