use clap::Parser;
use multi_hash::MultiMap;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    /// Values stored under each key.
    #[arg(short = 'f', long = "fan_out", default_value_t = 4)]
    fan_out: usize,

    /// Percentage of pairs removed after filling, to show free-slot reuse.
    #[arg(short = 'r', long = "remove_percent", default_value_t = 0)]
    remove_percent: u64,
}

fn print_histogram(map: &MultiMap<u64, u64>) {
    let histogram = map.chain_histogram();
    let buckets: usize = histogram.iter().sum();
    println!("Chain length histogram ({buckets} buckets):");
    for (length, &count) in histogram.iter().enumerate() {
        if count == 0 {
            continue;
        }
        println!(
            "  {length:>3}: {count:>8} ({:.2}%)",
            count as f64 / buckets as f64 * 100.0
        );
    }
}

fn main() {
    let args = Args::parse();
    let fan_out = args.fan_out.max(1);

    println!(
        "Creating MultiMap with target capacity: {}",
        args.target_capacity
    );

    let mut map: MultiMap<u64, u64> = MultiMap::with_capacity(args.target_capacity);
    println!("Actual capacity: {}", map.capacity());

    let num_keys = (map.capacity() / fan_out) as u64;
    println!("Filling map with {num_keys} keys x {fan_out} values...");
    for key in 0..num_keys {
        map.add_all(key, (0..fan_out as u64).map(|v| key * 1000 + v));
    }

    println!("Inserted {} values into map", map.len());
    println!(
        "Final load factor: {:.2}%",
        (map.len() as f64 / map.capacity() as f64) * 100.0
    );
    print_histogram(&map);

    if args.remove_percent > 0 {
        let mut removed = 0;
        for key in 0..num_keys {
            if key * 100 / num_keys.max(1) < args.remove_percent {
                removed += map.remove(&key);
            }
        }
        println!("Removed {removed} values; refilling...");
        for key in num_keys..num_keys * 2 {
            if map.len() + fan_out > map.capacity() {
                break;
            }
            map.add_all(key, (0..fan_out as u64).map(|v| key * 1000 + v));
        }
        println!(
            "Capacity after refill: {} ({} values)",
            map.capacity(),
            map.len()
        );
        print_histogram(&map);
    }
}
