use ppcnuma::{DrcIndexAllocator, HwlocPlatform, RunMode, Topology};

/// Prints the NUMA topology of this machine, or of the description file given
/// as the first argument.
fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let mode = std::env::args_os()
        .nth(1)
        .map_or(RunMode::Live, |path| RunMode::Test(path.into()));
    let platform = HwlocPlatform::new()?;
    let mut allocator = DrcIndexAllocator::new();
    let topology = Topology::acquire(&mode, &platform, &mut allocator)?;

    println!(
        "*** {} topology with {} node(s), {} CPU(s)",
        if topology.is_synthetic() { "Synthetic" } else { "Live" },
        topology.node_count(),
        topology.cpu_count()
    );
    println!(
        "*** {} LMB(s) on nodes with CPUs, {} on CPU-less nodes",
        topology.lmb_count(),
        topology.cpuless_lmb_count()
    );
    if let Some(depth) = topology.min_common_depth() {
        println!("*** Minimum common associativity depth: {depth}");
    }
    for node in topology.nodes() {
        let lmbs = node
            .lmbs()
            .map(|lmb| lmb.drc_index().to_string())
            .collect::<Vec<_>>();
        println!(
            "Node {}: {} CPU(s), {} LMB(s) [{}]",
            node.id(),
            node.n_cpus(),
            node.n_lmbs(),
            lmbs.join(", ")
        );
    }
    Ok(())
}
