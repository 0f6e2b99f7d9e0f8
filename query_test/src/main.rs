use mtree::data::{Descriptor, DistanceId, Euclidean, Relation};
use mtree::tree::{Tree, TreeConfig};
use mtree::{BulkLoader, QueryTrace};

use glob::glob;
use kdam::tqdm;
use log::{info, warn};
use rand::prelude::*;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead};
use std::path::Path;
use std::time::Instant;

type CliResult<T> = std::result::Result<T, Box<dyn Error>>;

fn read_lines<P>(filename: P) -> io::Result<io::Lines<io::BufReader<File>>>
where P: AsRef<Path>, {
    let file = File::open(filename)?;
    Ok(io::BufReader::new(file).lines())
}

use clap::Parser;
#[derive(Parser, Debug)] #[command(author, version, about, long_about = None)]
struct Args {

    //One of knn, range, rknn, verify, dump, write_config
    #[arg(short, long)]
    task: String,

    //Glob of csv files holding one vector per line
    #[arg(short, long)]
    input_glob: Option<String>,

    //Skip the first line of every input file
    #[arg(long, default_value_t = false)]
    header: bool,

    //Generate this many random vectors instead of reading files
    #[arg(short, long)]
    random: Option<usize>,

    //Dimension of random vectors
    #[arg(short, long, default_value_t = 8)]
    dim: usize,

    //Tree config yaml, defaults are used when absent
    #[arg(short, long)]
    config: Option<String>,

    #[arg(short, long, default_value_t = 10)]
    k: usize,

    #[arg(long, default_value_t = 0.1)]
    radius: f64,

    //Comma separated query vector, random when absent
    #[arg(short, long)]
    query: Option<String>,

    //Number of random queries for verify
    #[arg(short, long, default_value_t = 100)]
    num_queries: usize,

    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    //Output filename for write_config
    #[arg(short, long)]
    output: Option<String>,
}

fn main() {

    env_logger::init();

    let args = Args::parse();

    let result = match args.task.as_str() {
        "knn" | "range" | "rknn" => single_query(&args),
        "verify" => verify(&args),
        "dump" => dump(&args),
        "write_config" => write_config(&args),
        _ => Err(format!("Unknown task: {}", args.task).into()),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(args: &Args) -> CliResult<TreeConfig> {

    let config = match &args.config {
        Some(filename) => TreeConfig::from_file(filename)?,
        None => TreeConfig::default(),
    };

    Ok(config)
}

fn load_relation(args: &Args, rng: &mut StdRng) -> CliResult<Relation<Descriptor>> {

    let mut relation = Relation::new();

    if let Some(n) = args.random {
        for _ in 0..n {
            relation.insert(Descriptor::random(rng, args.dim));
        }
        return Ok(relation);
    }

    let pattern = match &args.input_glob {
        Some(p) => p,
        None => return Err("either --input-glob or --random is required".into()),
    };

    for entry in glob(pattern)? {

        let filename = entry?;
        info!("reading {}", filename.display());

        for (i, line) in read_lines(&filename)?.enumerate() {
            let line = line?;
            if (args.header && i == 0) || line.trim().is_empty() {
                continue;
            }
            relation.insert(Descriptor::from_csv_line(&line)?);
        }
    }

    Ok(relation)
}

fn build_tree(args: &Args, rng: &mut StdRng) -> CliResult<Tree<Descriptor, Euclidean>> {

    let mut config = load_config(args)?;
    config.progress = true;

    if args.task == "rknn" && config.k_max < args.k {
        warn!("raising k_max from {} to {} for reverse knn", config.k_max, args.k);
        config.k_max = args.k;
    }

    let relation = load_relation(args, rng)?;
    info!("loaded {} objects", relation.len());

    let start = Instant::now();
    let tree = BulkLoader::new(config).build(relation, Euclidean)?;
    info!("built tree in {:.3}s", start.elapsed().as_secs_f64());

    Ok(tree)
}

fn query_descriptor(args: &Args, rng: &mut StdRng, dim: usize) -> CliResult<Descriptor> {

    let descriptor = match &args.query {
        Some(s) => Descriptor::from_csv_line(s)?,
        None => Descriptor::random(rng, dim),
    };

    Ok(descriptor)
}

fn tree_dim(tree: &Tree<Descriptor, Euclidean>, fallback: usize) -> usize {
    match tree.relation.iter().next() {
        Some((_, d)) => d.len(),
        None => fallback,
    }
}

fn single_query(args: &Args) -> CliResult<()> {

    let mut rng = StdRng::seed_from_u64(args.seed);
    let tree = build_tree(args, &mut rng)?;

    let descriptor = query_descriptor(args, &mut rng, tree_dim(&tree, args.dim))?;
    info!("query {}", descriptor.yaml());

    let mut query_trace = QueryTrace::new();
    let start = Instant::now();

    let hits = match args.task.as_str() {
        "knn" => tree.knn_query_traced(&descriptor, args.k, &mut query_trace)?,
        "range" => tree.range_query_traced(&descriptor, args.radius, &mut query_trace)?,
        _ => tree.reverse_knn_query_traced(&descriptor, args.k, &mut query_trace)?,
    };

    info!("{} query: {:.6}s, {} nodes visited, {} distance computations",
          args.task, start.elapsed().as_secs_f64(), query_trace.nodes_visited, query_trace.distance_computations);

    println!("{}", serde_json::to_string_pretty(&hits)?);

    Ok(())
}

fn brute_force(tree: &Tree<Descriptor, Euclidean>, query: &Descriptor) -> Vec<DistanceId> {

    let mut all: Vec<DistanceId> = tree
        .relation
        .iter()
        .map(|(id, o)| DistanceId::new(query.distance(o), id))
        .collect();
    all.sort_by(DistanceId::ascending);

    all
}

/// Each object's distance to its kth nearest other object by linear scan, indexed by id. +inf
/// when there are fewer than k other objects.
fn brute_force_knn_distances(relation: &Relation<Descriptor>, k: usize) -> Vec<f64> {

    let mut kth = Vec::with_capacity(relation.len());
    for (id, object) in relation.iter() {
        let mut others: Vec<f64> = relation
            .iter()
            .filter(|(other, _)| *other != id)
            .map(|(_, o)| object.distance(o))
            .collect();
        others.sort_by(|a, b| a.total_cmp(b));

        kth.push(match k {
            0 => f64::INFINITY,
            _ => others.get(k - 1).copied().unwrap_or(f64::INFINITY),
        });
    }

    kth
}

fn verify(args: &Args) -> CliResult<()> {

    let mut rng = StdRng::seed_from_u64(args.seed);

    let mut config = load_config(args)?;
    config.k_max = config.k_max.max(args.k);
    let relation = load_relation(args, &mut rng)?;
    let tree = BulkLoader::new(config).build(relation, Euclidean)?;

    let dim = tree_dim(&tree, args.dim);

    let start = Instant::now();
    let kth = brute_force_knn_distances(&tree.relation, args.k);
    info!("brute force kNN distances for k={} in {:.3}s", args.k, start.elapsed().as_secs_f64());

    let mut mismatches = 0;
    let mut tree_seconds = 0.0;
    let mut brute_seconds = 0.0;

    for _ in tqdm!(0..args.num_queries) {

        let query = Descriptor::random(&mut rng, dim);

        let start = Instant::now();
        let knn = tree.knn_query(&query, args.k)?;
        let range = tree.range_query(&query, args.radius)?;
        let rknn = tree.reverse_knn_query(&query, args.k)?;
        tree_seconds += start.elapsed().as_secs_f64();

        let start = Instant::now();
        let all = brute_force(&tree, &query);
        let expected_knn: Vec<DistanceId> = all.iter().copied().take(args.k).collect();
        let expected_range: Vec<DistanceId> = all.iter().copied().filter(|h| h.distance <= args.radius).collect();
        let expected_rknn: Vec<DistanceId> = all.iter().copied().filter(|h| h.distance <= kth[h.id as usize]).collect();
        brute_seconds += start.elapsed().as_secs_f64();

        for (name, got, expected) in [("knn", &knn, &expected_knn), ("range", &range, &expected_range), ("rknn", &rknn, &expected_rknn)] {
            if got != expected {
                mismatches += 1;
                warn!("{} mismatch for query {}: {} vs {} results", name, query.yaml(), got.len(), expected.len());
            }
        }
    }

    info!("tree: {:.3}s, brute force: {:.3}s over {} queries", tree_seconds, brute_seconds, args.num_queries);
    println!("{} mismatches in {} queries", mismatches, args.num_queries);

    match mismatches {
        0 => Ok(()),
        _ => Err(format!("{} mismatches", mismatches).into()),
    }
}

fn dump(args: &Args) -> CliResult<()> {

    let mut rng = StdRng::seed_from_u64(args.seed);
    let tree = build_tree(args, &mut rng)?;

    print!("{}", tree.output_depths()?);

    Ok(())
}

fn write_config(args: &Args) -> CliResult<()> {

    let filename = match &args.output {
        Some(f) => f,
        None => return Err("--output is required for write_config".into()),
    };

    let config = load_config(args)?;
    config.to_file(filename)?;

    Ok(())
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn knn_distances_by_linear_scan() {

        // 0 1 2 5 9
        let relation = Relation::from_vec([0.0, 1.0, 2.0, 5.0, 9.0].iter().map(|&v| Descriptor::from_vec(vec![v])).collect());

        assert_eq!(brute_force_knn_distances(&relation, 1), vec![1.0, 1.0, 1.0, 3.0, 4.0]);
        assert_eq!(brute_force_knn_distances(&relation, 4), vec![9.0, 8.0, 7.0, 5.0, 9.0]);
        assert!(brute_force_knn_distances(&relation, 5).iter().all(|d| d.is_infinite()));
    }

    #[test]
    fn tree_reverse_knn_agrees_with_linear_scan() {

        let mut rng = StdRng::seed_from_u64(7);
        let relation = Relation::from_vec((0..80).map(|_| Descriptor::random(&mut rng, 2)).collect());
        let config = TreeConfig {
            leaf_capacity: 3,
            fanout: 3,
            k_max: 3,
            seed: 1,
            progress: false,
        };
        let kth = brute_force_knn_distances(&relation, 3);
        let tree = BulkLoader::new(config).build(relation, Euclidean).unwrap();

        for _ in 0..10 {
            let query = Descriptor::random(&mut rng, 2);
            let expected: Vec<DistanceId> = brute_force(&tree, &query)
                .into_iter()
                .filter(|h| h.distance <= kth[h.id as usize])
                .collect();

            assert_eq!(tree.reverse_knn_query(&query, 3).unwrap(), expected);
        }
    }
}
