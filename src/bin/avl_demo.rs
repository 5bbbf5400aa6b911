use cordyceps_avl::AvlMap;

#[cfg(feature = "demo")]
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}

fn print_keys(map: &AvlMap<u32, &str>) {
    println!(
        "height {}: {:?}",
        map.height(),
        map.keys().copied().collect::<Vec<_>>()
    );
}

fn main() {
    #[cfg(feature = "demo")]
    init_tracing();

    let mut map = AvlMap::new();

    for (key, value) in [(4, "d"), (2, "b"), (6, "f"), (1, "a"), (3, "c"), (5, "e"), (7, "g")] {
        map.insert(key, value);
        map.assert_invariants();
    }
    print_keys(&map);

    let mut dot = String::new();
    if map.dotgraph("demo", &mut dot).is_ok() {
        println!("{dot}");
    }

    map.insert(3, "C");
    println!("3 => {:?}", map.at(&3));

    map.remove(&4);
    map.assert_invariants();
    print_keys(&map);

    match map.at(&4) {
        Ok(value) => println!("4 => {value}"),
        Err(err) => println!("4: {err}"),
    }

    while let Some((key, value)) = map.pop_first() {
        println!("popped {key} => {value}");
        map.assert_invariants();
    }
}
