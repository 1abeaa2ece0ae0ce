macro_rules! cfg_feature {
    (
        #![feature = $feature:literal]
        $($item:item)*
    ) => {
        $(
            #[cfg(feature = $feature)]
            #[cfg_attr(docsrs, doc(cfg(feature = $feature)))]
            $item
        )*
    };
}
