fn main() -> anyhow::Result<()> {
    fallwatch::cli::run()
}
