pub mod demux;
