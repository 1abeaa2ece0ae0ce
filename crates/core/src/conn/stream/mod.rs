mod straight;
cfg_feature! {
    #![feature = "rustls"]
    mod handshake;
    pub use handshake::HandshakeStream;
}
pub use straight::StraightStream;
