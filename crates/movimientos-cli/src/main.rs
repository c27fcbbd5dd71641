fn main() -> anyhow::Result<()> {
    movimientos_cli::run(std::env::args())
}
